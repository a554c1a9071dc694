use anyhow::Result;
use chrono::Utc;

use legiswatch::config::Config;
use legiswatch::scheduler::TickSchedule;

/// Print the effective configuration after validation
pub async fn check_config(config: Config) -> Result<()> {
    let keywords = config.monitor.keyword_set()?;
    let schedule = TickSchedule::from_config(&config.schedule)?;
    let now = Utc::now();

    println!("Configuration OK");
    println!("{:-<40}", "");
    println!(
        "Keywords: {} (case_sensitive={}, whole_word={})",
        keywords.len(),
        config.monitor.case_sensitive,
        config.monitor.match_whole_word
    );
    for keyword in keywords.iter() {
        println!("  - {}", keyword.text());
    }
    println!("Source: {}{}", config.ingestion.api_base_url, config.ingestion.endpoint);
    println!(
        "State: {:?} at {}",
        config.storage.backend,
        config.storage.path.display()
    );
    println!(
        "Delivery: {} to {} recipient(s)",
        config.notification.webhook_url.as_deref().unwrap_or("log"),
        config.notification.recipients.len()
    );
    println!("Next fetch: {}", schedule.next_fetch(now).to_rfc3339());
    println!("Next daily report: {}", schedule.next_daily(now).to_rfc3339());
    println!("Next weekly report: {}", schedule.next_weekly(now).to_rfc3339());

    Ok(())
}
