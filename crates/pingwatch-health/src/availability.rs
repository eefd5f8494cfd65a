//! Availability scoring.

use tracing::error;

use pingwatch_core::Sample;

/// Mean `average` across every sample, as a percentage.
///
/// `None` when there are no samples, or when any sample is not a number;
/// the latter is logged together with the raw data.
pub fn evaluate(machine: &str, samples: &[Sample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    match mean(samples) {
        Ok(availability) => Some(availability),
        Err(offending) => {
            let data = serde_json::to_string(samples).unwrap_or_else(|_| format!("{samples:?}"));
            error!(
                %machine,
                metric = %offending.metric,
                average = %offending.average,
                %data,
                "failed to compute availability"
            );
            None
        }
    }
}

fn mean(samples: &[Sample]) -> Result<f64, &Sample> {
    let mut sum = 0.0;
    for sample in samples {
        sum += sample.average.as_f64().ok_or(sample)?;
    }
    Ok(sum / samples.len() as f64)
}
