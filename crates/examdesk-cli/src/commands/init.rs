//! The `examdesk init` command.

use std::path::Path;

use anyhow::Result;

use examdesk_client::config::LOCAL_CONFIG;

pub fn execute() -> Result<()> {
    if Path::new(LOCAL_CONFIG).exists() {
        println!("{LOCAL_CONFIG} already exists, skipping.");
    } else {
        std::fs::write(LOCAL_CONFIG, SAMPLE_CONFIG)?;
        println!("Created {LOCAL_CONFIG}");
    }

    println!("\nNext steps:");
    println!("  1. Edit {LOCAL_CONFIG} with your backend address and token");
    println!("  2. Run: examdesk take --exam <id>");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examdesk configuration

base_url = "http://localhost:8000/"
token = "${EXAMDESK_TOKEN}"
timeout_secs = 30
retry_attempts = 3
retry_delay_ms = 500

[session]
autosave_debounce_ms = 1500
warning_threshold_secs = 300
# Send unsaved edits before submitting instead of dropping them.
flush_on_submit = false
hydrate_on_resume = true
"#;
