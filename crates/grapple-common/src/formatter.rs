use crate::protocol::{ActionOutcome, CandidateProbeResult, DropdownReadiness};

pub fn format_outcome(outcome: &ActionOutcome) -> String {
    let mut output = match (outcome.succeeded, outcome.technique_used) {
        (true, Some(technique)) => format!(
            "ok via {} ({} attempt{})",
            technique,
            outcome.attempts,
            if outcome.attempts == 1 { "" } else { "s" }
        ),
        _ => format!("failed after {} attempts", outcome.attempts),
    };

    for failure in &outcome.failures {
        output.push_str(&format!("\n  - {}", failure));
    }
    output
}

pub fn format_readiness(readiness: &DropdownReadiness) -> String {
    if readiness.is_populated {
        format!(
            "{} option(s) after {} refresh(es)",
            readiness.option_count, readiness.refresh_count
        )
    } else {
        format!("empty after {} refresh(es)", readiness.refresh_count)
    }
}

pub fn format_probe(result: &CandidateProbeResult) -> String {
    let rejected = if result.rejected_values.is_empty() {
        String::from("none")
    } else {
        result.rejected_values.join(", ")
    };

    match &result.accepted_value {
        Some(value) => format!("accepted {:?} (rejected: {})", value, rejected),
        None => format!("exhausted (rejected: {})", rejected),
    }
}

/// Mask `value` when `field_name` contains one of `sensitive_fields`, ignoring case.
pub fn mask_sensitive(value: &str, field_name: &str, sensitive_fields: &[String]) -> String {
    let field = field_name.to_lowercase();
    let is_sensitive = sensitive_fields
        .iter()
        .any(|f| field.contains(&f.to_lowercase()));

    if is_sensitive {
        "••••••••".to_string()
    } else {
        value.to_string()
    }
}
