//! Sound level and temperature conversions for raw sensor readings.

use thiserror::Error;

/// Errors converting a microphone buffer into a sound level.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SignalError {
    #[error("audio buffer is empty")]
    EmptyBuffer,

    /// Every sample sat on the mean, so the level in decibels is undefined.
    #[error("audio buffer is silent (rms {rms}), decibel level undefined")]
    Silent { rms: f64 },
}

/// Arithmetic mean of the samples, or `None` for an empty buffer.
pub fn mean(samples: &[u16]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: u64 = samples.iter().map(|&s| u64::from(s)).sum();
    Some(sum as f64 / samples.len() as f64)
}

/// Root-mean-square deviation of the samples from their truncated mean.
///
/// The mean is truncated to an integer before subtracting, which removes the
/// DC bias of the PDM microphone.
pub fn normalized_rms(samples: &[u16]) -> Result<f64, SignalError> {
    let bias = mean(samples).ok_or(SignalError::EmptyBuffer)?.trunc();

    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let dev = f64::from(s) - bias;
            dev * dev
        })
        .sum();

    Ok((sum_sq / samples.len() as f64).sqrt())
}

/// Converts an RMS amplitude to decibels (`20 * log10(rms)`).
pub fn rms_to_decibels(rms: f64) -> Result<f64, SignalError> {
    if !rms.is_finite() || rms <= 0.0 {
        return Err(SignalError::Silent { rms });
    }
    Ok(20.0 * rms.log10())
}

/// Sound level of a sample buffer in decibels.
pub fn normalized_rms_as_dbs(samples: &[u16]) -> Result<f64, SignalError> {
    rms_to_decibels(normalized_rms(samples)?)
}

/// Celsius to Fahrenheit, truncated toward zero.
pub fn c_to_f(celsius: f64) -> i32 {
    (celsius * 9.0 / 5.0 + 32.0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2, 4, 9]), Some(5.0));
    }

    #[test]
    fn test_normalized_rms_square_wave() {
        // Mean 150, deviations +-50.
        let samples: Vec<u16> = (0..160).map(|i| if i % 2 == 0 { 100 } else { 200 }).collect();
        let rms = normalized_rms(&samples).expect("rms");
        assert!((rms - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalized_rms_truncates_mean() {
        // Mean is 1.5, truncated to 1: deviations are 0 and 1.
        let rms = normalized_rms(&[1, 2]).expect("rms");
        assert!((rms - (0.5f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_normalized_rms_empty_buffer() {
        assert_eq!(normalized_rms(&[]), Err(SignalError::EmptyBuffer));
    }

    #[test]
    fn test_decibels_of_known_rms() {
        let db = rms_to_decibels(100.0).expect("db");
        assert!((db - 40.0).abs() < 1e-9);

        let samples: Vec<u16> = (0..160).map(|i| if i % 2 == 0 { 1000 } else { 1020 }).collect();
        let db = normalized_rms_as_dbs(&samples).expect("db");
        assert!((db - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_buffer_is_an_error_not_neg_infinity() {
        let samples = [32_768u16; 160];
        let err = normalized_rms_as_dbs(&samples).unwrap_err();
        assert_eq!(err, SignalError::Silent { rms: 0.0 });
    }

    #[test]
    fn test_rms_to_decibels_rejects_nan() {
        assert!(matches!(
            rms_to_decibels(f64::NAN),
            Err(SignalError::Silent { .. })
        ));
    }

    #[test]
    fn test_c_to_f_matches_standard_formula_within_truncation() {
        for tenths in -400..=600 {
            let c = f64::from(tenths) / 10.0;
            let exact = c * 9.0 / 5.0 + 32.0;
            let f = f64::from(c_to_f(c));
            assert!((exact - f).abs() < 1.0, "c={c} exact={exact} f={f}");
            assert!(f.abs() <= exact.abs() + 1e-9, "must truncate toward zero");
        }
    }

    #[test]
    fn test_c_to_f_truncates() {
        assert_eq!(c_to_f(25.0), 77);
        assert_eq!(c_to_f(25.9), 78); // 78.62
        assert_eq!(c_to_f(0.0), 32);
        assert_eq!(c_to_f(-40.0), -40);
    }
}
