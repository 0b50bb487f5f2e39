// 📉 Stock Forecast - next-step inventory from a short count history
//
// Ordinary least squares through (0, h[0]) .. (n-1, h[n-1]), evaluated at
// x = n and rounded half-to-even. Stateless.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Fewest readings a line is fitted through
pub const MIN_HISTORY: usize = 3;

/// Predictions strictly below this raise an alert
pub const LOW_STOCK_THRESHOLD: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub predicted_stock: i64,
    pub alert: bool,
    pub message: String,
}

/// Least-squares line `intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Fit through (i, history[i]). Needs at least two points.
    pub fn through(history: &[i64]) -> Option<Self> {
        if history.len() < 2 {
            return None;
        }

        let n = history.len() as f64;
        let x_mean = (n - 1.0) / 2.0;
        let y_mean = history.iter().map(|&y| y as f64).sum::<f64>() / n;

        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (i, &y) in history.iter().enumerate() {
            let dx = i as f64 - x_mean;
            sxy += dx * (y as f64 - y_mean);
            sxx += dx * dx;
        }

        let slope = sxy / sxx;
        Some(LinearFit {
            slope,
            intercept: y_mean - slope * x_mean,
        })
    }

    pub fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Predict the next stock level and flag low stock
pub fn forecast(history: &[i64]) -> Result<ForecastResult> {
    if history.len() < MIN_HISTORY {
        return Err(LedgerError::InsufficientData {
            required: MIN_HISTORY,
            actual: history.len(),
        });
    }

    let fit = LinearFit::through(history).ok_or_else(|| {
        LedgerError::Compute("cannot fit a line through fewer than two points".to_string())
    })?;
    let predicted = fit.at(history.len() as f64).round_ties_even();

    if !predicted.is_finite() || predicted < i64::MIN as f64 || predicted >= i64::MAX as f64 {
        return Err(LedgerError::Compute(format!(
            "prediction {predicted} is not a representable stock level"
        )));
    }

    let predicted_stock = predicted as i64;
    let alert = predicted_stock < LOW_STOCK_THRESHOLD;

    Ok(ForecastResult {
        predicted_stock,
        alert,
        message: if alert {
            "Low stock alert".to_string()
        } else {
            "Stock level is fine".to_string()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_declining_stock_alerts() {
        let result = forecast(&[10, 9, 8]).unwrap();
        assert_eq!(
            result,
            ForecastResult {
                predicted_stock: 7,
                alert: true,
                message: "Low stock alert".to_string(),
            }
        );
    }

    #[test]
    fn test_rising_stock_is_fine() {
        let fit = LinearFit::through(&[100, 102, 104, 106]).unwrap();
        assert_eq!(fit.slope, 2.0);
        assert_eq!(fit.intercept, 100.0);

        let result = forecast(&[100, 102, 104, 106]).unwrap();
        assert_eq!(result.predicted_stock, 108);
        assert!(!result.alert);
        assert_eq!(result.message, "Stock level is fine");
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::one(&[40])]
    #[case::two(&[50, 52])]
    fn test_short_history_is_insufficient(#[case] history: &[i64]) {
        let err = forecast(history).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientData { required: 3, actual } if actual == history.len()
        ));
    }

    #[rstest]
    #[case::half_down_to_even(&[0, 0, 1, 0], 0)]
    #[case::half_up_to_even(&[0, 0, 1, 1], 2)]
    #[case::two_and_half(&[0, 0, 1, 2], 2)]
    #[case::fraction(&[21, 20, 20], 19)]
    fn test_rounding(#[case] history: &[i64], #[case] expected: i64) {
        assert_eq!(forecast(history).unwrap().predicted_stock, expected);
    }

    #[rstest]
    #[case::at_threshold(&[20, 20, 20], false)]
    #[case::just_below(&[21, 20, 19], true)]
    #[case::negative(&[5, 2, -1], true)]
    fn test_alert_threshold(#[case] history: &[i64], #[case] alert: bool) {
        assert_eq!(forecast(history).unwrap().alert, alert);
    }

    #[test]
    fn test_overflowing_prediction_is_compute_error() {
        let err = forecast(&[0, i64::MAX / 2, i64::MAX]).unwrap_err();
        assert!(matches!(err, LedgerError::Compute(_)));
    }
}
