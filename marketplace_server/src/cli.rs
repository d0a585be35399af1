use std::{env, env::VarError};

/// The server is configured through the environment only. Any argument at all (`--help`, `-h`, a typo) prints the
/// help text and the current, non-secret configuration. Returns true if the help was printed and the server should
/// not start.
pub fn handle_command_line_args() -> bool {
    let printed_help = env::args().len() > 1;
    if printed_help {
        display_readme();
        display_envs();
    }
    printed_help
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Secrets (webhook secrets, API keys) are deliberately left off this list
    const DISPLAY_ENVS: [&str; 17] = [
        "RUST_LOG",
        "MKT_HOST",
        "MKT_PORT",
        "MKT_DATABASE_URL",
        "MKT_RESERVATION_WINDOW_MINS",
        "MKT_RETURN_WINDOW_DAYS",
        "MKT_JOB_MAX_ATTEMPTS",
        "MKT_JOB_POLL_INTERVAL_SECS",
        "MKT_EXPIRY_SWEEP_INTERVAL_SECS",
        "MKT_PAYOUT_CHECK_INTERVAL_SECS",
        "MKT_CHECKOUT_SUCCESS_URL",
        "MKT_CHECKOUT_CANCEL_URL",
        "MKT_CARD_WEBHOOK_TOLERANCE_SECS",
        "MKT_CARD_API_BASE",
        "MKT_CARD_TIMEOUT_SECS",
        "MKT_MOBILE_MONEY_ENABLED",
        "MKT_MOBILE_MONEY_HMAC_CHECKS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
