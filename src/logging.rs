use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FOXCONSOLE_LOG";

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "foxconsole=debug"
    } else {
        "foxconsole=info"
    }
}

/// `FOXCONSOLE_LOG` wins over `-v` when set.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_default_level() {
        assert_eq!(default_directive(false), "foxconsole=info");
        assert_eq!(default_directive(true), "foxconsole=debug");
    }
}
