use sockline_frame::Value;

/// Rewrites or vetoes events on their way out and in.
///
/// Returning `None` drops the event. Middleware runs in configuration order.
pub trait EventMiddleware: Send + Sync {
    fn will_emit(
        &self,
        _namespace: &str,
        event: String,
        args: Vec<Value>,
    ) -> Option<(String, Vec<Value>)> {
        Some((event, args))
    }

    fn did_receive(
        &self,
        _namespace: &str,
        event: String,
        args: Vec<Value>,
    ) -> Option<(String, Vec<Value>)> {
        Some((event, args))
    }
}

pub(crate) enum Direction {
    Outbound,
    Inbound,
}

pub(crate) fn run_chain(
    chain: &[std::sync::Arc<dyn EventMiddleware>],
    direction: Direction,
    namespace: &str,
    event: String,
    args: Vec<Value>,
) -> Option<(String, Vec<Value>)> {
    let mut current = (event, args);
    for middleware in chain {
        current = match direction {
            Direction::Outbound => middleware.will_emit(namespace, current.0, current.1)?,
            Direction::Inbound => middleware.did_receive(namespace, current.0, current.1)?,
        };
    }
    Some(current)
}
