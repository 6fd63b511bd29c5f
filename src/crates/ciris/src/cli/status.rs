//! `ciris status` - health report plus task/thought counts by status.

use crate::health::HealthChecker;
use crate::models::{TaskStatus, ThoughtStatus};
use crate::repositories::{TaskRepository, ThoughtRepository};
use crate::{Result, RuntimeContext};

pub async fn run(context: &RuntimeContext) -> Result<()> {
    let report = HealthChecker::check_context(context).await?;
    println!("health: {}", report.status);
    for check in &report.checks {
        println!(
            "  {:<16} {:<10} {}",
            check.name,
            check.status.to_string(),
            check.message.clone().unwrap_or_default()
        );
    }

    let tasks = TaskRepository::new(context.database_arc());
    let thoughts = ThoughtRepository::new(context.database_arc());

    println!("tasks:");
    for status in [
        TaskStatus::Active,
        TaskStatus::Paused,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Deferred,
    ] {
        let count = tasks.count_by_status(status.as_str()).await?;
        println!("  {:<10} {}", status.as_str(), count);
    }

    println!("thoughts:");
    for status in [
        ThoughtStatus::Pending,
        ThoughtStatus::Processing,
        ThoughtStatus::Completed,
        ThoughtStatus::Deferred,
        ThoughtStatus::Failed,
    ] {
        let count = thoughts.list_by_status(status.as_str()).await?.len();
        println!("  {:<10} {}", status.as_str(), count);
    }

    Ok(())
}
