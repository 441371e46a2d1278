//! Deterministic datasets.

use chrono::{Months, NaiveDate};
use datastory_common::{Cell, Column, DatasetDescriptor, DatasetSample, SAMPLE_ROW_CAP};

/// Two numeric columns `x` and `y` over `n` rows whose Pearson correlation is exactly `r`
/// (up to floating point), a `noise` column uncorrelated with `x`, and a text
/// `segment` column cycling through "a", "b" and "c".
pub fn correlated_sample(n: usize, r: f64) -> DatasetSample {
    let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let zx = unit_centered(&x);

    // Fixed pseudo-noise, made orthogonal to x so the mix hits r exactly.
    let raw: Vec<f64> = (0..n).map(|i| ((i * 37) % 17) as f64).collect();
    let centered = unit_centered(&raw);
    let proj: f64 = centered.iter().zip(&zx).map(|(a, b)| a * b).sum();
    let ortho: Vec<f64> = centered.iter().zip(&zx).map(|(e, z)| e - proj * z).collect();
    let ze = unit_centered(&ortho);

    let mix = (1.0 - r * r).sqrt();
    let y: Vec<f64> = zx.iter().zip(&ze).map(|(a, b)| 500.0 + 100.0 * (r * a + mix * b)).collect();
    let noise: Vec<f64> = ze.iter().map(|e| 50.0 + 10.0 * e).collect();
    let segment: Vec<Cell> = (0..n).map(|i| Cell::Text(["a", "b", "c"][i % 3].to_string())).collect();

    DatasetSample::from_columns(vec![
        Column::from_cells("x", x.into_iter().map(Cell::Float).collect()),
        Column::from_cells("y", y.into_iter().map(Cell::Float).collect()),
        Column::from_cells("noise", noise.into_iter().map(Cell::Float).collect()),
        Column::from_cells("segment", segment),
    ])
    .expect("columns have equal length")
}

fn unit_centered(values: &[f64]) -> Vec<f64> {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();
    centered.into_iter().map(|v| v / norm).collect()
}

/// Monthly sales with `date`, `revenue` and `region` columns; revenue grows
/// steadily and the "north" region grows fastest.
pub fn sales_csv() -> String {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).expect("valid date");
    let regions = ["north", "south", "east"];
    let mut csv = String::from("date,revenue,region\n");
    for month in 0..24u32 {
        let date = start + Months::new(month);
        let region = regions[month as usize % regions.len()];
        let boost = if region == "north" { 45.0 } else { 20.0 };
        let revenue = 1_000.0 + boost * month as f64 + (month % 4) as f64 * 7.5;
        csv.push_str(&format!("{},{revenue:.2},{region}\n", date.format("%Y-%m-%d")));
    }
    csv
}

pub fn sales_sample() -> DatasetSample {
    DatasetSample::from_csv(sales_csv().as_bytes(), SAMPLE_ROW_CAP).expect("fixture CSV parses")
}

pub fn descriptor(filename: &str, sample: DatasetSample) -> DatasetDescriptor {
    DatasetDescriptor::new(format!("datasets/fixture/{filename}"), filename, sample)
}

pub fn sales_descriptor() -> DatasetDescriptor {
    descriptor("sales.csv", sales_sample())
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastory_common::stats::pearson;
    use datastory_common::DType;

    #[test]
    fn test_correlated_sample_hits_target() {
        let sample = correlated_sample(100, 0.9);
        let x = sample.column("x").unwrap().numeric_cells();
        let y = sample.column("y").unwrap().numeric_cells();
        let noise = sample.column("noise").unwrap().numeric_cells();
        assert!((pearson(&x, &y).unwrap() - 0.9).abs() < 1e-9);
        assert!(pearson(&x, &noise).unwrap().abs() < 1e-9);
        assert_eq!(sample.column("segment").unwrap().dtype, DType::Object);
    }

    #[test]
    fn test_sales_columns() {
        let sample = sales_sample();
        assert_eq!(sample.n_rows(), 24);
        let dtypes: Vec<DType> = sample.columns().iter().map(|c| c.dtype).collect();
        assert_eq!(dtypes, vec![DType::DateTime, DType::Float64, DType::Object]);
    }
}
