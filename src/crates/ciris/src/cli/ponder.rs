//! `ciris ponder <task description> <questions>` - creates a task and a
//! thought carrying a `PONDER` action, `questions` split on `;`. The next
//! round's action-selection evaluator sees these questions as context; this
//! command only records the step.

use crate::audit::AuditEvent;
use crate::events::RuntimeEvent;
use crate::models::{HandlerAction, Task, Thought};
use crate::repositories::{TaskRepository, ThoughtRepository};
use crate::{Result, RuntimeContext};

pub async fn run(context: &RuntimeContext, task_description: &str, questions: &str) -> Result<()> {
    let tasks = TaskRepository::new(context.database_arc());
    let thoughts = ThoughtRepository::new(context.database_arc());

    let task = Task::new(task_description, "cli_local");
    tasks.save(&task).await?;
    context.event_logger().log(&RuntimeEvent::task_created(&task.task_id, task_description));

    let questions: Vec<String> = questions
        .split(';')
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();

    let mut thought = Thought::new(&task.task_id, task_description, uuid::Uuid::new_v4().to_string());
    thought.ponder_count += 1;
    thought.set_final_action(&HandlerAction::Ponder { questions: questions.clone() })?;
    thoughts.save(&thought).await?;

    context
        .audit()
        .append(AuditEvent::new(
            "ponder",
            thought.thought_id.clone(),
            serde_json::json!({ "task_id": task.task_id, "questions": questions }),
        ))
        .await?;

    println!(
        "thought {} recorded PONDER with {} question(s) for task {}",
        thought.thought_id,
        questions.len(),
        task.task_id
    );
    Ok(())
}
