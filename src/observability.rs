use crate::validation::ValidationErrors;

/// Counter: save operations. Labels: status.
pub const SAVES_TOTAL: &str = "chainkeep_saves_total";

/// Counter: delete operations. Labels: status.
pub const DELETES_TOTAL: &str = "chainkeep_deletes_total";

/// Counter: predecessor `date_to` rewrites (closing or reopening).
pub const NEIGHBOR_ADJUSTMENTS_TOTAL: &str = "chainkeep_neighbor_adjustments_total";

/// Counter: validation messages produced. Labels: kind.
pub const VALIDATION_ERRORS_TOTAL: &str = "chainkeep_validation_errors_total";

/// Status label for an operation outcome.
pub fn status_label(errors: &ValidationErrors) -> &'static str {
    if errors.is_empty() { "ok" } else { "rejected" }
}

/// Count every message in `errors` under its localisation key.
pub fn record_validation_errors(errors: &ValidationErrors) {
    for message in errors.messages() {
        metrics::counter!(VALIDATION_ERRORS_TOTAL, "kind" => message.key()).increment(1);
    }
}
