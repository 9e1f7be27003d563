use std::{fs, path::Path};

use crate::types::Data;

/// Sign-preserving log compression for features with no natural bound
pub fn symlog(value: f64) -> f64 {
    value.signum() * value.abs().ln_1p()
}

/// Replaces NaN and infinities so they never reach the network
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample standard deviation, zero for fewer than two values
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let avg = mean(data);
    let variance =
        data.iter().map(|value| (value - avg).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

/// Calcualtes the exponential moving average
///
/// # Arguments
///
/// * `alpha` - The weight given to each new value. For example, 0.18 keeps 82% of the previous average
///
pub fn ema(data: &[f64], alpha: f64) -> Data {
    let mut averages: Data = Vec::with_capacity(data.len());

    for value in data {
        let avg = match averages.last() {
            Some(previous) => value * alpha + previous * (1. - alpha),
            None => *value,
        };
        averages.push(avg);
    }
    averages
}

pub fn sma(data: &[f64], window: usize) -> Option<f64> {
    if window == 0 || data.len() < window {
        return None;
    }
    Some(mean(&data[data.len() - window..]))
}

pub fn get_differences(data: &[f64]) -> Data {
    data.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

/// Get the relative strength index value for each price difference
pub fn get_rsi_values(data: &[f64], period: usize) -> Data {
    let diffs = get_differences(data);

    let mut upwards = Vec::with_capacity(diffs.len());
    let mut downwards = Vec::with_capacity(diffs.len());

    for diff in diffs.iter() {
        if *diff >= 0. {
            upwards.push(*diff);
            downwards.push(0.);
            continue;
        }

        downwards.push(diff.abs());
        upwards.push(0.);
    }

    let alpha = 1. / period.max(1) as f64;

    let upward_avg = ema(&upwards, alpha);
    let downward_avg = ema(&downwards, alpha);

    upward_avg
        .iter()
        .zip(downward_avg.iter())
        .map(|(up, down)| {
            if *down == 0.0 {
                return if *up == 0.0 { 50.0 } else { 100.0 };
            }
            let rs = up / down;
            100. - (100. / (1. + rs))
        })
        .collect()
}

/// Moving average of `data` over `window` values. The first `window - 1`
/// entries average whatever history exists.
pub fn moving_average(data: &[f64], window: usize) -> Data {
    let window = window.max(1);
    let mut result = Vec::with_capacity(data.len());
    let mut sum = 0.0;
    for (index, value) in data.iter().enumerate() {
        sum += value;
        if index >= window {
            sum -= data[index - window];
        }
        result.push(sum / (index + 1).min(window) as f64);
    }
    result
}

pub fn create_folder_if_not_exists(dir: impl AsRef<Path>) -> std::io::Result<()> {
    let dir = dir.as_ref();
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
