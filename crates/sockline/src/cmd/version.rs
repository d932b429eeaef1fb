use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("sockline {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: sockline");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("protocol: EIO=4");
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    if let Some(target) = option_env!("SOCKLINE_BUILD_TARGET") {
        println!("build_target: {target}");
    }
    if let Some(profile) = option_env!("SOCKLINE_BUILD_PROFILE") {
        println!("build_profile: {profile}");
    }
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: client={}, cli=true", cfg!(feature = "client"));

    Ok(SUCCESS)
}
