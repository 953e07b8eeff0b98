//! Output mode flags and logging setup shared by every subcommand.

use tracing_subscriber::EnvFilter;

/// `--json` was given: print machine-readable results on stdout.
pub fn is_json() -> bool {
    std::env::var_os("TAGHARVEST_JSON").is_some()
}

/// `--quiet` was given: print nothing but errors.
pub fn is_quiet() -> bool {
    std::env::var_os("TAGHARVEST_QUIET").is_some()
}

pub fn is_verbose() -> bool {
    std::env::var_os("TAGHARVEST_VERBOSE").is_some()
}

/// Print a JSON value on stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to encode JSON output: {e}"),
    }
}

/// Install the global tracing subscriber. Logs go to stderr so `--json`
/// output on stdout stays parseable.
pub fn init_tracing() {
    let level = if is_verbose() {
        "tagharvest=debug"
    } else if is_quiet() {
        "tagharvest=warn"
    } else {
        "tagharvest=info"
    };
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = level.parse() {
        filter = filter.add_directive(directive);
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if is_json() {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };
    if let Err(e) = result {
        eprintln!("  Warning: logging already initialized: {e}");
    }
}
