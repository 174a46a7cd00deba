use anyhow::{Context, Result};
use approvals_models::{
    AbandonRequest, HistoryEvent, InstanceDetail, InstanceSummary, RaiseEventRequest, RaiseEventResponse,
    StartApprovalRequest, StartApprovalResponse, WorkflowInput,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::commands::server::{api_url, ensure_server_running};

#[allow(clippy::too_many_arguments)]
pub async fn run_start(
    subject: String,
    message: String,
    correlation_id: String,
    instance_id: Option<String>,
    name: String,
    industry: String,
    form_input_id: String,
    business_process_description: String,
    process_frequency: String,
    process_duration: String,
) -> Result<()> {
    ensure_server_running().await?;

    let request = StartApprovalRequest {
        instance_id,
        input: WorkflowInput {
            form_input_id,
            message,
            subject,
            name,
            industry,
            business_process_description,
            process_frequency,
            process_duration,
            correlation_id,
        },
    };

    let response = reqwest::Client::new()
        .post(format!("{}/api/approvals", api_url()))
        .json(&request)
        .send()
        .await
        .context("Failed to connect to API")?;

    if response.status() == StatusCode::CONFLICT {
        anyhow::bail!(
            "Instance '{}' already exists",
            request.instance_id.as_deref().unwrap_or_default()
        );
    }

    let started: StartApprovalResponse = read_json(response).await?;

    println!("✓ Approval started");
    println!("  Instance: {}", started.instance_id);
    println!("  Status:   {}", started.status);
    println!();
    println!("Raise the decision with:");
    println!("  approvals-server raise {} --approve", started.instance_id);

    Ok(())
}

pub async fn run_raise(instance_id: String, approve: bool, reject: bool, reason: Option<String>) -> Result<()> {
    if approve == reject {
        anyhow::bail!("Pass exactly one of --approve or --reject");
    }

    ensure_server_running().await?;

    let request = RaiseEventRequest {
        instance_id: Some(instance_id.clone()),
        approved: Some(approve),
        reason,
    };

    let response = reqwest::Client::new()
        .post(format!("{}/api/approvals/raise", api_url()))
        .json(&request)
        .send()
        .await
        .context("Failed to connect to API")?;

    let raised: RaiseEventResponse = read_json(response).await?;
    let decision = if raised.approved { "approved" } else { "rejected" };
    println!("✓ Instance '{}' {}", instance_id, decision);

    Ok(())
}

pub async fn run_abandon(instance_id: String, reason: Option<String>) -> Result<()> {
    ensure_server_running().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/approvals/{}/abandon", api_url(), instance_id))
        .json(&AbandonRequest { reason })
        .send()
        .await
        .context("Failed to connect to API")?;

    let body: serde_json::Value = read_json(response).await?;
    println!(
        "✓ Instance '{}' abandoned (status: {})",
        instance_id,
        body["status"].as_str().unwrap_or("-")
    );

    Ok(())
}

pub async fn run_list(status: Option<String>, output: String) -> Result<()> {
    ensure_server_running().await?;

    let mut request = reqwest::Client::new().get(format!("{}/api/approvals", api_url()));
    if let Some(status) = &status {
        request = request.query(&[("status", status)]);
    }
    let response = request.send().await.context("Failed to connect to API")?;

    let instances: Vec<InstanceSummary> = read_json(response).await?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&instances)?);
        return Ok(());
    }

    println!(
        "{:<38} {:<16} {:<20} {:<20}",
        "INSTANCE", "STATUS", "CORRELATION ID", "UPDATED"
    );
    println!("{}", "-".repeat(96));

    for inst in &instances {
        println!(
            "{:<38} {:<16} {:<20} {:<20}",
            inst.id,
            inst.status.as_str(),
            inst.correlation_id,
            inst.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(error) = &inst.last_error {
            println!("  └ {}", error);
        }
    }

    println!();
    println!("{} instance(s) found", instances.len());

    Ok(())
}

pub async fn run_get(instance_id: String, history: bool, output: String) -> Result<()> {
    ensure_server_running().await?;

    let response = reqwest::get(format!("{}/api/approvals/{}", api_url(), instance_id))
        .await
        .context("Failed to connect to API")?;

    if response.status() == StatusCode::NOT_FOUND {
        anyhow::bail!("Instance '{}' not found", instance_id);
    }

    let detail: InstanceDetail = read_json(response).await?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("Instance: {}", detail.instance_id);
    println!("{}", "=".repeat(60));
    println!();
    println!("Status:");
    println!("  Status:         {}", detail.status);
    println!("  Correlation ID: {}", detail.correlation_id);
    if let Some(event) = &detail.waiting_for {
        println!("  Waiting for:    {}", event);
    }
    if let Some(error) = &detail.last_error {
        println!("  Last error:     {}", error);
    }
    if let Some(completion) = &detail.completion {
        println!("  Result:         {}", completion.value);
        println!("  Delivered:      {}", detail.delivered);
    }
    println!();
    println!("Timestamps:");
    println!("  Created:        {}", detail.created_at.to_rfc3339());
    println!("  Updated:        {}", detail.updated_at.to_rfc3339());

    if history {
        println!();
        println!("History:");
        for entry in &detail.history {
            println!(
                "  {:>3}  {}  {:<24} {}",
                entry.sequence_number,
                entry.recorded_at.format("%H:%M:%S%.3f"),
                entry.event.kind(),
                describe(&entry.event)
            );
        }
    }

    Ok(())
}

fn describe(event: &HistoryEvent) -> String {
    match event {
        HistoryEvent::ActivityScheduled { name, .. } => name.clone(),
        HistoryEvent::ActivityAttempted { invocation, .. } => {
            format!("{} attempt {}: {:?}", invocation.activity_name, invocation.attempt, invocation.outcome)
        }
        HistoryEvent::ActivityFailed { name, attempts, error, .. } => {
            format!("{} after {} attempt(s): {}", name, attempts, error)
        }
        HistoryEvent::WaiterRegistered { name, deadline, .. } => match deadline {
            Some(deadline) => format!("{} (deadline {})", name, deadline.to_rfc3339()),
            None => name.clone(),
        },
        HistoryEvent::EventRaised { name, payload, .. } => format!("{} {}", name, payload),
        HistoryEvent::WaiterAbandoned { name, reason, .. } => format!("{}: {}", name, reason),
        HistoryEvent::OrchestrationCompleted { result } => result.value.clone(),
        HistoryEvent::OrchestrationFailed { error } => error.clone(),
        HistoryEvent::CompletionDelivered { attempts } => format!("after {} attempt(s)", attempts),
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        anyhow::bail!(
            "API error: {} {}",
            status,
            body["error"].as_str().unwrap_or_default()
        );
    }

    response.json().await.context("Failed to decode API response")
}
