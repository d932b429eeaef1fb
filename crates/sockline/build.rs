//! Records build metadata reported by `sockline version --extended`.

fn main() {
    for (var, exported) in [
        ("TARGET", "SOCKLINE_BUILD_TARGET"),
        ("PROFILE", "SOCKLINE_BUILD_PROFILE"),
    ] {
        if let Ok(value) = std::env::var(var) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={var}");
    }
}
