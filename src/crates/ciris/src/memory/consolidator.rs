//! Consolidation pipeline: folds correlations into summary nodes and links
//! them with deterministic, idempotent edges.

use crate::error::Result;
use crate::models::{
    basic_summary_id, daily_summary_id, AuditSummary, ConversationMessage, ConversationSummary,
    GraphEdge, GraphNode, LatencyPercentiles, MetricAggregate, NodeScope, NodeType, PerTaskSummary,
    SummaryKind, TaskSummary, TraceSummary, TsdbSummary,
};
use crate::repositories::{CorrelationRepository, GraphRepository, TaskRepository};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn percentiles(mut values: Vec<f64>) -> LatencyPercentiles {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    LatencyPercentiles {
        p50: percentile(&values, 50.0),
        p95: percentile(&values, 95.0),
        p99: percentile(&values, 99.0),
    }
}

/// The enclosing 6-hour consolidation window for `now`:
/// `(period_start, period_end, period_label)`.
pub fn six_hour_window(now: DateTime<Utc>) -> (String, String, String) {
    use chrono::Timelike;
    let hour = (now.hour() / 6) * 6;
    let start = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .expect("window hour is always valid")
        .and_utc();
    let end = start + chrono::Duration::hours(6);
    let label = start.format("%Y%m%dT%H").to_string();
    (start.to_rfc3339(), end.to_rfc3339(), label)
}

fn node_type_for(kind: SummaryKind) -> NodeType {
    match kind {
        SummaryKind::Tsdb => NodeType::TsdbSummary,
        SummaryKind::Conversation => NodeType::ConversationSummary,
        SummaryKind::Trace => NodeType::TraceSummary,
        SummaryKind::Task => NodeType::TaskSummary,
        SummaryKind::Audit => NodeType::AuditSummary,
    }
}

/// Semantic relationship for a same-window edge between two summary types.
fn cross_type_relationship(a: SummaryKind, b: SummaryKind) -> &'static str {
    use SummaryKind::*;
    match (a, b) {
        (Audit, _) | (_, Audit) => "SECURES_EXECUTION",
        (Tsdb, Trace) | (Trace, Tsdb) => "GENERATES_METRICS",
        (Task, Trace) | (Trace, Task) => "DRIVES_PROCESSING",
        _ => "TEMPORAL_CORRELATION",
    }
}

fn parse_json(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::Value::Null)
}

fn f64_field(value: &serde_json::Value, key: &str) -> Option<f64> {
    value.get(key).and_then(|v| v.as_f64())
}

fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

/// One basic-level window's worth of consolidation for every summary type,
/// plus the daily/weekly roll-ups and the temporal/cross-type/orphan edge
/// maintenance.
pub struct Consolidator {
    correlations: CorrelationRepository,
    tasks: TaskRepository,
    graph: GraphRepository,
}

impl Consolidator {
    pub fn new(correlations: CorrelationRepository, tasks: TaskRepository, graph: GraphRepository) -> Self {
        Self { correlations, tasks, graph }
    }

    /// Runs basic consolidation for the window `[period_start, period_end)`,
    /// skipping any summary type whose id already exists (idempotent).
    /// Every run also re-links the temporal chains, adds the same-window
    /// cross-type edges, and sweeps orphaned edges.
    pub async fn consolidate_basic(&self, period_start: &str, period_end: &str, period_label: &str) -> Result<Vec<String>> {
        let mut created = Vec::new();

        if self.consolidate_tsdb(period_start, period_end, period_label).await? {
            created.push(basic_summary_id(SummaryKind::Tsdb, period_label));
        }
        if self.consolidate_conversations(period_start, period_end, period_label).await? {
            created.push(basic_summary_id(SummaryKind::Conversation, period_label));
        }
        if self.consolidate_traces(period_start, period_end, period_label).await? {
            created.push(basic_summary_id(SummaryKind::Trace, period_label));
        }
        if self.consolidate_tasks(period_start, period_end, period_label).await? {
            created.push(basic_summary_id(SummaryKind::Task, period_label));
        }
        if self.consolidate_audit(period_start, period_end, period_label).await? {
            created.push(basic_summary_id(SummaryKind::Audit, period_label));
        }

        for kind in SummaryKind::all() {
            self.link_temporal_chain(kind).await?;
        }
        self.link_cross_type(period_label).await?;
        self.cleanup_orphan_edges().await?;

        Ok(created)
    }

    async fn store_summary<S: serde::Serialize>(&self, id: String, kind: SummaryKind, summary: &S) -> Result<()> {
        let node = GraphNode::new(
            id,
            node_type_for(kind),
            NodeScope::Local,
            serde_json::to_value(summary)?,
            "consolidation_service",
        );
        self.graph.upsert_node(&node).await?;
        Ok(())
    }

    async fn consolidate_tsdb(&self, period_start: &str, period_end: &str, period_label: &str) -> Result<bool> {
        let id = basic_summary_id(SummaryKind::Tsdb, period_label);
        if self.graph.find_node(&id).await?.is_some() {
            return Ok(false);
        }

        let correlations = self
            .correlations
            .list_by_type_in_window("METRIC_DATAPOINT", period_start, period_end)
            .await?;

        let mut metrics: HashMap<String, Vec<f64>> = HashMap::new();
        let mut action_counts: HashMap<String, u64> = HashMap::new();
        let mut error_count = 0u64;
        let mut total_tokens = 0u64;
        let mut total_cost = 0.0;
        let mut total_carbon = 0.0;
        let mut total_energy = 0.0;

        for corr in &correlations {
            *action_counts.entry(corr.action_type.clone()).or_insert(0) += 1;
            let request = parse_json(&corr.request_data_json);
            if let Some(v) = f64_field(&request, "value") {
                metrics.entry(corr.handler_name.clone()).or_default().push(v);
            }
            if request.get("error").and_then(|v| v.as_bool()).unwrap_or(false) {
                error_count += 1;
            }
            total_tokens += f64_field(&request, "tokens").unwrap_or(0.0) as u64;
            total_cost += f64_field(&request, "cost").unwrap_or(0.0);
            total_carbon += f64_field(&request, "carbon_g").unwrap_or(0.0);
            total_energy += f64_field(&request, "energy_kwh").unwrap_or(0.0);
        }

        let aggregates = metrics
            .into_iter()
            .map(|(name, values)| {
                let count = values.len() as u64;
                let sum: f64 = values.iter().sum();
                let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                (name, MetricAggregate { count, sum, min, max, avg })
            })
            .collect::<HashMap<_, _>>();

        let total = correlations.len() as u64;
        let success_rate = if total == 0 {
            1.0
        } else {
            1.0 - (error_count as f64 / total as f64)
        };

        let summary = TsdbSummary {
            period_start: period_start.to_string(),
            period_end: period_end.to_string(),
            period_label: period_label.to_string(),
            consolidation_level: "basic".to_string(),
            source_correlation_count: total,
            metrics: aggregates,
            total_tokens,
            total_cost,
            total_carbon,
            total_energy,
            action_counts,
            error_count,
            success_rate,
        };
        self.store_summary(id, SummaryKind::Tsdb, &summary).await?;
        Ok(true)
    }

    /// Full conversation content is preserved in the summary: readers of the
    /// graph never need to go back to raw correlations for transcripts.
    async fn consolidate_conversations(&self, period_start: &str, period_end: &str, period_label: &str) -> Result<bool> {
        let id = basic_summary_id(SummaryKind::Conversation, period_label);
        if self.graph.find_node(&id).await?.is_some() {
            return Ok(false);
        }

        let correlations = self
            .correlations
            .list_by_type_in_window("SERVICE_INTERACTION", period_start, period_end)
            .await?;
        let conversational: Vec<_> = correlations
            .iter()
            .filter(|c| matches!(c.action_type.as_str(), "speak" | "observe"))
            .collect();

        let mut by_channel: HashMap<String, Vec<ConversationMessage>> = HashMap::new();
        let mut users = HashSet::new();
        let mut action_counts: HashMap<String, u64> = HashMap::new();
        let mut service_call_counts: HashMap<String, u64> = HashMap::new();
        let mut failures = 0u64;

        for corr in &conversational {
            *action_counts.entry(corr.action_type.clone()).or_insert(0) += 1;
            *service_call_counts.entry(corr.service_type.clone()).or_insert(0) += 1;

            let request = parse_json(&corr.request_data_json);
            let response = corr
                .response_data_json
                .as_deref()
                .map(parse_json)
                .unwrap_or(serde_json::Value::Null);
            let success = response
                .get("ok")
                .and_then(|v| v.as_bool())
                .or_else(|| request.get("success").and_then(|v| v.as_bool()))
                .unwrap_or(true);
            if !success {
                failures += 1;
            }

            let channel = str_field(&request, "channel_id").unwrap_or("unknown").to_string();
            let author_id = str_field(&request, "author_id").unwrap_or("ciris_agent").to_string();
            let author_name = str_field(&request, "author_name").unwrap_or(&author_id).to_string();
            users.insert(author_id.clone());

            by_channel.entry(channel).or_default().push(ConversationMessage {
                timestamp: corr.timestamp.clone(),
                author_id,
                author_name,
                content: str_field(&request, "content").unwrap_or_default().to_string(),
                execution_time_ms: f64_field(&request, "execution_time_ms").unwrap_or(0.0) as u64,
                success,
            });
        }

        let total_messages = conversational.len() as u64;
        let success_rate = if total_messages == 0 {
            1.0
        } else {
            1.0 - (failures as f64 / total_messages as f64)
        };

        // Channels involved in the window become first-class nodes so the
        // summary can point at them.
        let channels: Vec<String> = by_channel.keys().cloned().collect();

        let summary = ConversationSummary {
            period_start: period_start.to_string(),
            period_end: period_end.to_string(),
            period_label: period_label.to_string(),
            consolidation_level: "basic".to_string(),
            source_correlation_count: total_messages,
            conversations_by_channel: by_channel,
            total_messages,
            unique_users: users.len() as u64,
            action_counts,
            service_call_counts,
            success_rate,
        };
        self.store_summary(id.clone(), SummaryKind::Conversation, &summary).await?;

        for channel in channels {
            let channel_node_id = format!("channel_{}", channel);
            let channel_node = GraphNode::new(
                channel_node_id.clone(),
                NodeType::Channel,
                NodeScope::Local,
                serde_json::json!({ "channel_id": channel }),
                "consolidation_service",
            );
            self.graph.upsert_node(&channel_node).await?;
            let edge = GraphEdge::new(
                id.clone(),
                channel_node_id,
                NodeScope::Local,
                "OCCURRED_IN_CHANNEL",
                1.0,
                serde_json::json!({}),
            );
            self.graph.insert_edge_or_ignore(&edge).await?;
        }
        for user in users {
            let user_node_id = format!("user_{}", user);
            let user_node = GraphNode::new(
                user_node_id.clone(),
                NodeType::User,
                NodeScope::Local,
                serde_json::json!({ "user_id": user }),
                "consolidation_service",
            );
            self.graph.upsert_node(&user_node).await?;
            let edge = GraphEdge::new(
                id.clone(),
                user_node_id,
                NodeScope::Local,
                "INVOLVED_USER",
                1.0,
                serde_json::json!({}),
            );
            self.graph.insert_edge_or_ignore(&edge).await?;
        }

        Ok(true)
    }

    async fn consolidate_traces(&self, period_start: &str, period_end: &str, period_label: &str) -> Result<bool> {
        let id = basic_summary_id(SummaryKind::Trace, period_label);
        if self.graph.find_node(&id).await?.is_some() {
            return Ok(false);
        }

        let spans = self
            .correlations
            .list_by_type_in_window("TRACE_SPAN", period_start, period_end)
            .await?;

        let mut task_ids = HashSet::new();
        let mut thought_ids = HashSet::new();
        let mut component_call_counts: HashMap<String, u64> = HashMap::new();
        let mut component_failure_counts: HashMap<String, u64> = HashMap::new();
        let mut component_latencies: HashMap<String, Vec<f64>> = HashMap::new();
        let mut handler_action_counts: HashMap<String, u64> = HashMap::new();
        let mut guardrail_violations: HashMap<String, u64> = HashMap::new();
        let mut dma_decision_counts: HashMap<String, u64> = HashMap::new();

        for span in &spans {
            let request = parse_json(&span.request_data_json);
            let tags = parse_json(&span.tags_json);

            if let Some(task_id) = str_field(&tags, "task_id") {
                task_ids.insert(task_id.to_string());
            }
            if let Some(thought_id) = str_field(&tags, "thought_id") {
                thought_ids.insert(thought_id.to_string());
            }

            *component_call_counts.entry(span.handler_name.clone()).or_insert(0) += 1;
            if request.get("error").and_then(|v| v.as_bool()).unwrap_or(false) {
                *component_failure_counts.entry(span.handler_name.clone()).or_insert(0) += 1;
            }
            if let Some(latency) = f64_field(&request, "duration_ms") {
                component_latencies.entry(span.handler_name.clone()).or_default().push(latency);
            }

            *handler_action_counts.entry(span.action_type.clone()).or_insert(0) += 1;

            if span.action_type == "guardrail_breach" {
                let violation = str_field(&request, "violation_type").unwrap_or("content_filter");
                *guardrail_violations.entry(violation.to_string()).or_insert(0) += 1;
            }
            if let Some(decision) = str_field(&request, "dma_decision") {
                *dma_decision_counts.entry(decision.to_string()).or_insert(0) += 1;
            }
        }

        let component_latency = component_latencies
            .into_iter()
            .map(|(component, values)| (component, percentiles(values)))
            .collect::<HashMap<_, _>>();

        let summary = TraceSummary {
            period_start: period_start.to_string(),
            period_end: period_end.to_string(),
            period_label: period_label.to_string(),
            consolidation_level: "basic".to_string(),
            source_correlation_count: spans.len() as u64,
            unique_task_count: task_ids.len() as u64,
            unique_thought_count: thought_ids.len() as u64,
            component_call_counts,
            component_failure_counts,
            component_latency,
            handler_action_counts,
            guardrail_violations,
            dma_decision_counts,
            total_tasks_processed: task_ids.len() as u64,
        };
        self.store_summary(id, SummaryKind::Trace, &summary).await?;
        Ok(true)
    }

    async fn consolidate_tasks(&self, period_start: &str, period_end: &str, period_label: &str) -> Result<bool> {
        let id = basic_summary_id(SummaryKind::Task, period_label);
        if self.graph.find_node(&id).await?.is_some() {
            return Ok(false);
        }

        let all_tasks = self.tasks.list().await?;
        let in_window: Vec<_> = all_tasks
            .into_iter()
            .filter(|t| t.created_at.as_str() >= period_start && t.created_at.as_str() < period_end)
            .collect();

        // Trace spans carry a `task_id` tag, which joins each task to the
        // handler actions its thoughts selected.
        let spans = self
            .correlations
            .list_by_type_in_window("TRACE_SPAN", period_start, period_end)
            .await?;
        let mut handlers_by_task: HashMap<String, HashMap<String, u64>> = HashMap::new();
        for span in &spans {
            let tags = parse_json(&span.tags_json);
            if let Some(task_id) = str_field(&tags, "task_id") {
                *handlers_by_task
                    .entry(task_id.to_string())
                    .or_default()
                    .entry(span.action_type.clone())
                    .or_insert(0) += 1;
            }
        }

        let mut by_status: HashMap<String, u64> = HashMap::new();
        let mut by_channel: HashMap<String, u64> = HashMap::new();
        let mut handler_usage: HashMap<String, u64> = HashMap::new();
        let mut retry_total = 0u64;
        let mut completed = 0u64;
        let mut durations = Vec::new();
        let mut task_summaries = Vec::new();
        let mut noteworthy = Vec::new();

        for task in &in_window {
            *by_status.entry(task.status.clone()).or_insert(0) += 1;
            *by_channel.entry(task.channel_id.clone()).or_insert(0) += 1;
            retry_total += task.retry_count as u64;
            if task.status == "completed" {
                completed += 1;
            }

            let mut duration_ms = 0.0;
            if let (Ok(created), Ok(updated)) = (
                DateTime::parse_from_rfc3339(&task.created_at),
                DateTime::parse_from_rfc3339(&task.updated_at),
            ) {
                duration_ms = (updated - created).num_milliseconds() as f64;
                durations.push(duration_ms);
            }

            let handlers_selected = handlers_by_task
                .get(&task.task_id)
                .cloned()
                .unwrap_or_default();
            for (handler, count) in &handlers_selected {
                *handler_usage.entry(handler.clone()).or_insert(0) += count;
            }

            if task.status == "failed" || task.retry_count > 0 {
                noteworthy.push(serde_json::json!({
                    "task_id": task.task_id,
                    "status": task.status,
                    "retry_count": task.retry_count,
                    "channel_id": task.channel_id,
                    "handlers_selected": handlers_selected,
                }));
            }

            task_summaries.push(PerTaskSummary {
                task_id: task.task_id.clone(),
                status: task.status.clone(),
                channel_id: task.channel_id.clone(),
                retry_count: task.retry_count,
                duration_ms,
                handlers_selected,
            });
        }

        let total = in_window.len() as u64;
        let completion_rate = if total == 0 { 0.0 } else { completed as f64 / total as f64 };

        let summary = TaskSummary {
            period_start: period_start.to_string(),
            period_end: period_end.to_string(),
            period_label: period_label.to_string(),
            consolidation_level: "basic".to_string(),
            source_correlation_count: total,
            task_count_by_status: by_status,
            task_count_by_channel: by_channel,
            completion_rate,
            handler_usage,
            duration: percentiles(durations),
            retry_total,
            task_summaries,
        };
        self.store_summary(id.clone(), SummaryKind::Task, &summary).await?;

        // Failed and retried tasks are flagged on the summary itself: a
        // single self-edge carrying the task data, so readers spot trouble
        // without re-querying the task table.
        if !noteworthy.is_empty() {
            let edge = GraphEdge::new(
                id.clone(),
                id,
                NodeScope::Local,
                "ERROR_TASK",
                1.0,
                serde_json::json!({ "tasks": noteworthy }),
            );
            self.graph.insert_edge_or_ignore(&edge).await?;
        }
        Ok(true)
    }

    async fn consolidate_audit(&self, period_start: &str, period_end: &str, period_label: &str) -> Result<bool> {
        let id = basic_summary_id(SummaryKind::Audit, period_label);
        if self.graph.find_node(&id).await?.is_some() {
            return Ok(false);
        }

        let events = self
            .correlations
            .list_by_type_in_window("AUDIT_EVENT", period_start, period_end)
            .await?;

        let mut auth_success_count = 0u64;
        let mut auth_failure_count = 0u64;
        let mut permission_denial_count = 0u64;
        let mut config_change_count = 0u64;

        // Canonical ordering for the digest: timestamp, then id as the tie
        // break, so re-running over the same rows always hashes identically.
        let mut ordered: Vec<(&str, &str)> = events
            .iter()
            .map(|e| (e.timestamp.as_str(), e.correlation_id.as_str()))
            .collect();
        ordered.sort();
        let mut hasher = Sha256::new();
        for (timestamp, correlation_id) in &ordered {
            hasher.update(timestamp.as_bytes());
            hasher.update(b"|");
            hasher.update(correlation_id.as_bytes());
            hasher.update(b"\n");
        }
        let audit_hash = hex::encode(hasher.finalize());

        for event in &events {
            match event.action_type.as_str() {
                "auth_success" => auth_success_count += 1,
                "auth_failure" => auth_failure_count += 1,
                "permission_denied" => permission_denial_count += 1,
                "config_change" => config_change_count += 1,
                _ => {}
            }
        }

        let summary = AuditSummary {
            period_start: period_start.to_string(),
            period_end: period_end.to_string(),
            period_label: period_label.to_string(),
            consolidation_level: "basic".to_string(),
            source_correlation_count: events.len() as u64,
            total_audit_events: events.len() as u64,
            auth_success_count,
            auth_failure_count,
            permission_denial_count,
            config_change_count,
            audit_hash,
            hash_algorithm: "sha256".to_string(),
        };
        self.store_summary(id, SummaryKind::Audit, &summary).await?;
        Ok(true)
    }

    /// Combines basic summaries of a given type into a single daily summary,
    /// idempotent via the `{type}_daily_{YYYYMMDD}` id pattern. Partial days
    /// consolidate whatever basic summaries exist.
    pub async fn consolidate_extensive(&self, kind: SummaryKind, yyyymmdd: &str, basic_ids: &[String]) -> Result<bool> {
        let daily_id = daily_summary_id(kind, yyyymmdd);
        if self.graph.find_node(&daily_id).await?.is_some() {
            return Ok(false);
        }

        let mut merged_attrs = serde_json::Map::new();
        let mut source_count = 0u64;
        for basic_id in basic_ids {
            if let Some(node) = self.graph.find_node(basic_id).await? {
                if let Ok(serde_json::Value::Object(attrs)) = node.attributes() {
                    source_count += attrs
                        .get("source_correlation_count")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    merged_attrs = attrs;
                }
            }
        }
        merged_attrs.insert("consolidation_level".to_string(), serde_json::json!("extensive"));
        merged_attrs.insert("source_correlation_count".to_string(), serde_json::json!(source_count));

        let node = GraphNode::new(
            daily_id,
            node_type_for(kind),
            NodeScope::Local,
            serde_json::Value::Object(merged_attrs),
            "consolidation_service",
        );
        self.graph.upsert_node(&node).await?;
        Ok(true)
    }

    /// Rolls a whole day's four basic windows into daily summaries, one per
    /// type. Partial days roll up whatever windows exist.
    pub async fn consolidate_daily(&self, day: chrono::NaiveDate) -> Result<Vec<String>> {
        let yyyymmdd = day.format("%Y%m%d").to_string();
        let mut created = Vec::new();
        for kind in SummaryKind::all() {
            let basic_ids: Vec<String> = [0u32, 6, 12, 18]
                .iter()
                .map(|h| basic_summary_id(kind, &format!("{}T{:02}", yyyymmdd, h)))
                .collect();
            if self.consolidate_extensive(kind, &yyyymmdd, &basic_ids).await? {
                created.push(daily_summary_id(kind, &yyyymmdd));
            }
        }
        Ok(created)
    }

    /// Combines daily summaries into one weekly/monthly profound summary,
    /// idempotent via the `{type}_profound_{label}` id pattern.
    pub async fn consolidate_profound(&self, kind: SummaryKind, label: &str, daily_ids: &[String]) -> Result<bool> {
        let profound_id = format!("{}_profound_{}", kind.as_str(), label);
        if self.graph.find_node(&profound_id).await?.is_some() {
            return Ok(false);
        }

        let mut merged_attrs = serde_json::Map::new();
        let mut source_count = 0u64;
        for daily_id in daily_ids {
            if let Some(node) = self.graph.find_node(daily_id).await? {
                if let Ok(serde_json::Value::Object(attrs)) = node.attributes() {
                    source_count += attrs
                        .get("source_correlation_count")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    merged_attrs = attrs;
                }
            }
        }
        merged_attrs.insert("consolidation_level".to_string(), serde_json::json!("profound"));
        merged_attrs.insert("source_correlation_count".to_string(), serde_json::json!(source_count));

        let node = GraphNode::new(
            profound_id,
            node_type_for(kind),
            NodeScope::Local,
            serde_json::Value::Object(merged_attrs),
            "consolidation_service",
        );
        self.graph.upsert_node(&node).await?;
        Ok(true)
    }

    /// Recomputes the `TEMPORAL_PREV`/`TEMPORAL_NEXT` chain over the basic
    /// summaries of `kind`, ordered by `period_start`. The latest summary
    /// carries a self-edge `TEMPORAL_NEXT` marker with `is_latest=true` so
    /// readers locate the head without a scan, and each `TEMPORAL_PREV`
    /// records `days_apart` so gaps in the chain are discoverable. Stale
    /// temporal edges (a superseded latest marker, or a bridge that a newly
    /// inserted summary now splits) are deleted before the fresh set is
    /// inserted, so re-running is idempotent.
    async fn link_temporal_chain(&self, kind: SummaryKind) -> Result<()> {
        let nodes = self.graph.list_nodes_by_type(node_type_for(kind).as_str()).await?;
        let mut chain: Vec<(String, DateTime<Utc>)> = nodes
            .iter()
            .filter_map(|n| {
                let attrs = n.attributes().ok()?;
                if attrs.get("consolidation_level")?.as_str()? != "basic" {
                    return None;
                }
                let start = attrs.get("period_start")?.as_str()?;
                let start = DateTime::parse_from_rfc3339(start).ok()?.with_timezone(&Utc);
                Some((n.id.clone(), start))
            })
            .collect();
        chain.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut desired = Vec::new();
        for pair in chain.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let days_apart = (next.1 - prev.1).num_days();
            desired.push(GraphEdge::new(
                prev.0.clone(),
                next.0.clone(),
                NodeScope::Local,
                "TEMPORAL_NEXT",
                1.0,
                serde_json::json!({}),
            ));
            desired.push(GraphEdge::new(
                next.0.clone(),
                prev.0.clone(),
                NodeScope::Local,
                "TEMPORAL_PREV",
                1.0,
                serde_json::json!({ "days_apart": days_apart }),
            ));
        }
        if let Some((latest, _)) = chain.last() {
            desired.push(GraphEdge::new(
                latest.clone(),
                latest.clone(),
                NodeScope::Local,
                "TEMPORAL_NEXT",
                1.0,
                serde_json::json!({ "is_latest": true }),
            ));
        }

        let desired_ids: HashSet<String> = desired.iter().map(|e| e.edge_id.clone()).collect();
        let mut stale = Vec::new();
        for (node_id, _) in &chain {
            for edge in self.graph.edges_from(node_id).await? {
                let temporal = edge.relationship == "TEMPORAL_NEXT" || edge.relationship == "TEMPORAL_PREV";
                if temporal && !desired_ids.contains(&edge.edge_id) {
                    stale.push(edge.edge_id);
                }
            }
        }
        self.graph.delete_edges(&stale).await?;

        for edge in &desired {
            self.graph.insert_edge_or_ignore(edge).await?;
        }
        Ok(())
    }

    /// Links every pair of summary types present in a window: C(N, 2) edges
    /// among N present types, no self-edges, each with its semantic
    /// relationship.
    async fn link_cross_type(&self, period_label: &str) -> Result<()> {
        let mut present = Vec::new();
        for kind in SummaryKind::all() {
            let id = basic_summary_id(kind, period_label);
            if self.graph.find_node(&id).await?.is_some() {
                present.push((kind, id));
            }
        }

        for (i, (kind_a, id_a)) in present.iter().enumerate() {
            for (kind_b, id_b) in present.iter().skip(i + 1) {
                let edge = GraphEdge::new(
                    id_a.clone(),
                    id_b.clone(),
                    NodeScope::Local,
                    cross_type_relationship(*kind_a, *kind_b),
                    1.0,
                    serde_json::json!({ "period_label": period_label }),
                );
                self.graph.insert_edge_or_ignore(&edge).await?;
            }
        }
        Ok(())
    }

    pub async fn cleanup_orphan_edges(&self) -> Result<u64> {
        let orphans = self.graph.find_orphaned_edges().await?;
        if orphans.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = orphans.iter().map(|e| e.edge_id.clone()).collect();
        let removed = self.graph.delete_edges(&ids).await?;
        info!(removed, "swept orphaned graph edges");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{CorrelationType, ServiceCorrelation, Task};
    use std::sync::Arc;

    const WINDOW_START: &str = "2026-01-15T06:00:00+00:00";
    const WINDOW_END: &str = "2026-01-15T12:00:00+00:00";
    const WINDOW_LABEL: &str = "20260115T06";

    async fn consolidator() -> Consolidator {
        let db = Arc::new(Database::test_in_memory().await.unwrap());
        Consolidator::new(
            CorrelationRepository::new(db.clone()),
            TaskRepository::new(db.clone()),
            GraphRepository::new(db),
        )
    }

    fn correlation_at(
        correlation_type: CorrelationType,
        handler: &str,
        action: &str,
        request: serde_json::Value,
        tags: serde_json::Value,
        timestamp: &str,
    ) -> ServiceCorrelation {
        let mut corr = ServiceCorrelation::new(
            correlation_type,
            "core",
            handler,
            action,
            request,
            tags,
        );
        corr.timestamp = timestamp.to_string();
        corr
    }

    async fn seed_full_window(consolidator: &Consolidator) {
        // 72 metric samples.
        for i in 0..72 {
            let corr = correlation_at(
                CorrelationType::MetricDatapoint,
                "llm_tokens",
                "record_metric",
                serde_json::json!({"value": i as f64, "tokens": 10}),
                serde_json::json!({}),
                "2026-01-15T06:30:00+00:00",
            );
            consolidator.correlations.save(&corr).await.unwrap();
        }

        // 4 conversations across 2 channels, 8 messages total.
        for (i, channel) in ["cli_local", "cli_local", "discord_general", "discord_general"]
            .iter()
            .enumerate()
        {
            for m in 0..2 {
                let corr = correlation_at(
                    CorrelationType::ServiceInteraction,
                    "speak_handler",
                    "speak",
                    serde_json::json!({
                        "channel_id": channel,
                        "content": format!("message {} in conversation {}", m, i),
                        "author_id": format!("user_{}", i % 2),
                        "author_name": format!("User {}", i % 2),
                        "execution_time_ms": 12.0,
                        "success": true,
                    }),
                    serde_json::json!({}),
                    "2026-01-15T07:00:00+00:00",
                );
                consolidator.correlations.save(&corr).await.unwrap();
            }
        }

        // 3 tasks with 3 thoughts each, one guardrail violation.
        for t in 0..3 {
            let mut task = Task::new(format!("task {}", t), "cli_local");
            task.created_at = "2026-01-15T06:10:00+00:00".to_string();
            task.status = "completed".to_string();
            consolidator.tasks.save(&task).await.unwrap();

            for th in 0..3 {
                let corr = correlation_at(
                    CorrelationType::TraceSpan,
                    "thought_processor",
                    "evaluate",
                    serde_json::json!({"duration_ms": 40.0 + th as f64}),
                    serde_json::json!({
                        "task_id": task.task_id,
                        "thought_id": format!("thought_{}_{}", t, th),
                    }),
                    "2026-01-15T08:00:00+00:00",
                );
                consolidator.correlations.save(&corr).await.unwrap();
            }
        }
        let violation = correlation_at(
            CorrelationType::TraceSpan,
            "guardrail",
            "guardrail_breach",
            serde_json::json!({"violation_type": "content_filter", "duration_ms": 3.0}),
            serde_json::json!({}),
            "2026-01-15T08:30:00+00:00",
        );
        consolidator.correlations.save(&violation).await.unwrap();

        // 9 audit events.
        for i in 0..9 {
            let action = match i {
                0 | 1 => "auth_success",
                2 => "auth_failure",
                3 => "permission_denied",
                4 => "config_change",
                _ => "handler_action",
            };
            let corr = correlation_at(
                CorrelationType::AuditEvent,
                "audit_service",
                action,
                serde_json::json!({}),
                serde_json::json!({}),
                "2026-01-15T09:00:00+00:00",
            );
            consolidator.correlations.save(&corr).await.unwrap();
        }
    }

    #[tokio::test]
    async fn full_window_produces_one_summary_of_each_type() {
        let consolidator = consolidator().await;
        seed_full_window(&consolidator).await;

        let created = consolidator
            .consolidate_basic(WINDOW_START, WINDOW_END, WINDOW_LABEL)
            .await
            .unwrap();
        assert_eq!(created.len(), 5);

        let conversation = consolidator
            .graph
            .find_node(&basic_summary_id(SummaryKind::Conversation, WINDOW_LABEL))
            .await
            .unwrap()
            .unwrap();
        let conversation: ConversationSummary =
            serde_json::from_value(conversation.attributes().unwrap()).unwrap();
        assert_eq!(conversation.total_messages, 8);
        assert_eq!(conversation.conversations_by_channel.len(), 2);
        assert_eq!(conversation.unique_users, 2);
        assert_eq!(
            conversation.conversations_by_channel["cli_local"].len(),
            4
        );

        let trace = consolidator
            .graph
            .find_node(&basic_summary_id(SummaryKind::Trace, WINDOW_LABEL))
            .await
            .unwrap()
            .unwrap();
        let trace: TraceSummary = serde_json::from_value(trace.attributes().unwrap()).unwrap();
        assert_eq!(trace.total_tasks_processed, 3);
        assert_eq!(trace.unique_thought_count, 9);
        assert_eq!(trace.guardrail_violations["content_filter"], 1);

        let audit = consolidator
            .graph
            .find_node(&basic_summary_id(SummaryKind::Audit, WINDOW_LABEL))
            .await
            .unwrap()
            .unwrap();
        let audit: AuditSummary = serde_json::from_value(audit.attributes().unwrap()).unwrap();
        assert_eq!(audit.total_audit_events, 9);
        assert_eq!(audit.auth_success_count, 2);
        assert_eq!(audit.audit_hash.len(), 64);
        assert_eq!(audit.hash_algorithm, "sha256");

        let tsdb = consolidator
            .graph
            .find_node(&basic_summary_id(SummaryKind::Tsdb, WINDOW_LABEL))
            .await
            .unwrap()
            .unwrap();
        let tsdb: TsdbSummary = serde_json::from_value(tsdb.attributes().unwrap()).unwrap();
        assert_eq!(tsdb.source_correlation_count, 72);
        assert_eq!(tsdb.metrics["llm_tokens"].count, 72);
        assert_eq!(tsdb.total_tokens, 720);

        let task = consolidator
            .graph
            .find_node(&basic_summary_id(SummaryKind::Task, WINDOW_LABEL))
            .await
            .unwrap()
            .unwrap();
        let task: TaskSummary = serde_json::from_value(task.attributes().unwrap()).unwrap();
        assert_eq!(task.source_correlation_count, 3);
        assert_eq!(task.handler_usage["evaluate"], 9);
        assert_eq!(task.task_summaries.len(), 3);
        for per_task in &task.task_summaries {
            assert_eq!(per_task.handlers_selected["evaluate"], 3);
            assert_eq!(per_task.status, "completed");
        }
    }

    #[tokio::test]
    async fn cross_type_edges_number_n_choose_two_with_no_self_edges() {
        let consolidator = consolidator().await;
        seed_full_window(&consolidator).await;
        consolidator
            .consolidate_basic(WINDOW_START, WINDOW_END, WINDOW_LABEL)
            .await
            .unwrap();

        let mut cross_edges = Vec::new();
        for kind in SummaryKind::all() {
            let id = basic_summary_id(kind, WINDOW_LABEL);
            for edge in consolidator.graph.edges_from(&id).await.unwrap() {
                if matches!(
                    edge.relationship.as_str(),
                    "SECURES_EXECUTION" | "GENERATES_METRICS" | "DRIVES_PROCESSING" | "TEMPORAL_CORRELATION"
                ) {
                    assert_ne!(edge.source_node_id, edge.target_node_id);
                    cross_edges.push(edge.edge_id);
                }
            }
        }
        // C(5, 2) = 10 among the five present types.
        assert_eq!(cross_edges.len(), 10);
    }

    #[tokio::test]
    async fn latest_summary_carries_a_self_edge_marker_that_moves_forward() {
        let consolidator = consolidator().await;

        consolidator
            .consolidate_basic(
                "2026-01-15T00:00:00+00:00",
                "2026-01-15T06:00:00+00:00",
                "20260115T00",
            )
            .await
            .unwrap();
        let first_id = basic_summary_id(SummaryKind::Task, "20260115T00");
        let marker: Vec<_> = consolidator
            .graph
            .edges_from(&first_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.source_node_id == e.target_node_id && e.relationship == "TEMPORAL_NEXT")
            .collect();
        assert_eq!(marker.len(), 1);

        consolidator
            .consolidate_basic(WINDOW_START, WINDOW_END, WINDOW_LABEL)
            .await
            .unwrap();

        // The marker moved to the newer summary.
        let old_marker: Vec<_> = consolidator
            .graph
            .edges_from(&first_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.source_node_id == e.target_node_id && e.relationship == "TEMPORAL_NEXT")
            .collect();
        assert!(old_marker.is_empty());

        let second_id = basic_summary_id(SummaryKind::Task, WINDOW_LABEL);
        let new_marker: Vec<_> = consolidator
            .graph
            .edges_from(&second_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.source_node_id == e.target_node_id && e.relationship == "TEMPORAL_NEXT")
            .collect();
        assert_eq!(new_marker.len(), 1);
        let attrs: serde_json::Value = serde_json::from_str(&new_marker[0].attributes_json).unwrap();
        assert_eq!(attrs["is_latest"], true);

        // The two summaries are chained in both directions.
        let forward: Vec<_> = consolidator
            .graph
            .edges_from(&first_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.relationship == "TEMPORAL_NEXT" && e.target_node_id == second_id)
            .collect();
        assert_eq!(forward.len(), 1);

        let backward: Vec<_> = consolidator
            .graph
            .edges_from(&second_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.relationship == "TEMPORAL_PREV")
            .collect();
        assert_eq!(backward.len(), 1);
        let attrs: serde_json::Value = serde_json::from_str(&backward[0].attributes_json).unwrap();
        assert_eq!(attrs["days_apart"], 0);
    }

    #[tokio::test]
    async fn consolidation_is_idempotent_per_window() {
        let consolidator = consolidator().await;
        seed_full_window(&consolidator).await;

        let first = consolidator
            .consolidate_basic(WINDOW_START, WINDOW_END, WINDOW_LABEL)
            .await
            .unwrap();
        assert_eq!(first.len(), 5);

        let second = consolidator
            .consolidate_basic(WINDOW_START, WINDOW_END, WINDOW_LABEL)
            .await
            .unwrap();
        assert!(second.is_empty(), "re-running the same window must be a no-op");
    }

    #[tokio::test]
    async fn failed_and_retried_tasks_get_an_error_task_self_edge() {
        let consolidator = consolidator().await;
        let mut failed = Task::new("doomed", "cli_local");
        failed.created_at = "2026-01-15T06:10:00+00:00".to_string();
        failed.status = "failed".to_string();
        failed.retry_count = 2;
        consolidator.tasks.save(&failed).await.unwrap();

        let span = correlation_at(
            CorrelationType::TraceSpan,
            "speak_handler",
            "speak",
            serde_json::json!({"duration_ms": 5.0}),
            serde_json::json!({"task_id": failed.task_id}),
            "2026-01-15T06:20:00+00:00",
        );
        consolidator.correlations.save(&span).await.unwrap();

        consolidator
            .consolidate_basic(WINDOW_START, WINDOW_END, WINDOW_LABEL)
            .await
            .unwrap();

        let id = basic_summary_id(SummaryKind::Task, WINDOW_LABEL);
        let self_edges: Vec<_> = consolidator
            .graph
            .edges_from(&id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.relationship == "ERROR_TASK")
            .collect();
        assert_eq!(self_edges.len(), 1);
        let attrs: serde_json::Value = serde_json::from_str(&self_edges[0].attributes_json).unwrap();
        assert_eq!(attrs["tasks"][0]["task_id"], failed.task_id);
        assert_eq!(attrs["tasks"][0]["handlers_selected"]["speak"], 1);
    }

    #[tokio::test]
    async fn conversation_summary_links_channels_and_users() {
        let consolidator = consolidator().await;
        seed_full_window(&consolidator).await;
        consolidator
            .consolidate_basic(WINDOW_START, WINDOW_END, WINDOW_LABEL)
            .await
            .unwrap();

        let id = basic_summary_id(SummaryKind::Conversation, WINDOW_LABEL);
        let edges = consolidator.graph.edges_from(&id).await.unwrap();
        let channel_edges = edges.iter().filter(|e| e.relationship == "OCCURRED_IN_CHANNEL").count();
        let user_edges = edges.iter().filter(|e| e.relationship == "INVOLVED_USER").count();
        assert_eq!(channel_edges, 2);
        assert_eq!(user_edges, 2);
        assert!(consolidator.graph.find_node("channel_cli_local").await.unwrap().is_some());
        assert!(consolidator.graph.find_node("user_user_0").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn extensive_consolidation_merges_basic_summaries() {
        let consolidator = consolidator().await;
        consolidator
            .consolidate_basic("2026-01-15T00:00:00+00:00", "2026-01-15T06:00:00+00:00", "20260115T00")
            .await
            .unwrap();

        let basic_ids = vec![basic_summary_id(SummaryKind::Task, "20260115T00")];
        let created = consolidator
            .consolidate_extensive(SummaryKind::Task, "20260115", &basic_ids)
            .await
            .unwrap();
        assert!(created);

        let again = consolidator
            .consolidate_extensive(SummaryKind::Task, "20260115", &basic_ids)
            .await
            .unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn profound_consolidation_merges_daily_summaries() {
        let consolidator = consolidator().await;
        consolidator
            .consolidate_basic("2026-01-15T00:00:00+00:00", "2026-01-15T06:00:00+00:00", "20260115T00")
            .await
            .unwrap();
        let basic_ids = vec![basic_summary_id(SummaryKind::Task, "20260115T00")];
        consolidator
            .consolidate_extensive(SummaryKind::Task, "20260115", &basic_ids)
            .await
            .unwrap();

        let daily_ids = vec![daily_summary_id(SummaryKind::Task, "20260115")];
        let created = consolidator
            .consolidate_profound(SummaryKind::Task, "2026W03", &daily_ids)
            .await
            .unwrap();
        assert!(created);

        let node = consolidator
            .graph
            .find_node("task_profound_2026W03")
            .await
            .unwrap()
            .unwrap();
        let attrs = node.attributes().unwrap();
        assert_eq!(attrs["consolidation_level"], "profound");
    }

    #[test]
    fn percentile_math_matches_nearest_rank() {
        let values = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        let p = percentiles(values);
        assert_eq!(p.p50, 30.0);
        assert_eq!(p.p99, 50.0);
    }

    #[test]
    fn cross_type_relationships_are_symmetric() {
        assert_eq!(
            cross_type_relationship(SummaryKind::Audit, SummaryKind::Task),
            cross_type_relationship(SummaryKind::Task, SummaryKind::Audit)
        );
        assert_eq!(
            cross_type_relationship(SummaryKind::Tsdb, SummaryKind::Conversation),
            "TEMPORAL_CORRELATION"
        );
    }
}
