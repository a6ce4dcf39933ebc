use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "unipkg_core=info";

/// Installs the global `fmt` subscriber. `RUST_LOG` wins over `default_filter`.
/// Returns false when a subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::init_tracing;

    #[test]
    fn second_initialization_is_rejected_without_panicking() {
        let _ = init_tracing("debug");
        assert!(!init_tracing("not a [valid filter"));
    }
}
