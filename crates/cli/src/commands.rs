// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only command implementations.

use crate::output::OutputFormat;
use anyhow::{bail, Result};
use cairn_storage::{ScanFilter, Scanner, StepSummary};

pub fn list(scanner: &Scanner, filter: &ScanFilter, output: OutputFormat) -> Result<()> {
    let summaries = scanner.scan(filter);
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        OutputFormat::Text => {
            if summaries.is_empty() {
                println!("no cached steps found");
                return Ok(());
            }
            println!(
                "{:<40} {:<18} {:<12} {:<10} {:>7}  {}",
                "NAMESPACE", "HASH", "RESULT", "ATTEMPT", "NUMBER", "UPDATED"
            );
            for summary in &summaries {
                println!("{}", format_row(summary));
            }
        }
    }
    Ok(())
}

pub fn show(scanner: &Scanner, namespace: &str, hash: &str, output: OutputFormat) -> Result<()> {
    let Some(detail) = scanner.detail(namespace, hash) else {
        bail!("no step directory for {namespace}/{hash}");
    };
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        OutputFormat::Text => {
            println!("namespace:  {}", detail.summary.namespace);
            println!("hash:       {}", detail.summary.hash);
            println!("directory:  {}", detail.directory.display());
            println!("result:     {}", detail.summary.result_status);
            if let Some(status) = detail.summary.attempt_status {
                let number = detail.summary.attempt_number.unwrap_or(0);
                println!("attempt:    {status} (number {number})");
            }
            println!("updated_at: {}", detail.summary.updated_at.to_rfc3339());
            println!("state:      {}", serde_json::to_string_pretty(&detail.state)?);
            if let Some(metadata) = &detail.metadata {
                println!("metadata:   {}", serde_json::to_string_pretty(metadata)?);
            }
        }
    }
    Ok(())
}

pub fn stats(scanner: &Scanner, output: OutputFormat) -> Result<()> {
    let stats = scanner.stats();
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Text => {
            println!("total:   {}", stats.total);
            println!("success: {}", stats.success_count);
            println!("failed:  {}", stats.failed_count);
            println!("running: {}", stats.running_count);
            println!("queued:  {}", stats.queued_count);
            if !stats.by_result_status.is_empty() {
                println!("by result status:");
                for (status, count) in &stats.by_result_status {
                    println!("  {status}: {count}");
                }
            }
            if !stats.by_attempt_status.is_empty() {
                println!("by attempt status:");
                for (status, count) in &stats.by_attempt_status {
                    println!("  {status}: {count}");
                }
            }
        }
    }
    Ok(())
}

fn format_row(summary: &StepSummary) -> String {
    format!(
        "{:<40} {:<18} {:<12} {:<10} {:>7}  {}",
        summary.namespace,
        summary.hash,
        summary.result_status.to_string(),
        summary
            .attempt_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string()),
        summary
            .attempt_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string()),
        summary.updated_at.to_rfc3339(),
    )
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
