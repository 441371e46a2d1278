//! Deterministic profiling of a dataset sample.

use std::collections::BTreeMap;

use datastory_common::stats::{describe, pearson, round_to};
use datastory_common::{DType, DatasetSample};

use crate::outputs::{ColumnProfile, ColumnTypes, Correlation, DatasetInfo, EdaProfile};

/// Correlations at or below this magnitude are not reported.
pub const CORRELATION_THRESHOLD: f64 = 0.5;

pub fn profile(sample: &DatasetSample) -> EdaProfile {
    let rows = sample.n_rows();
    let missing_cells: usize = sample.columns().iter().map(|c| c.missing()).sum();

    let dataset_info = DatasetInfo {
        rows,
        columns: sample.n_cols(),
        memory_usage: sample.columns().iter().map(|c| c.memory_usage()).sum(),
        missing_cells,
        duplicate_rows: sample.duplicate_rows(),
    };

    let count = |pred: fn(DType) -> bool| sample.columns().iter().filter(|c| pred(c.dtype)).count();
    let column_types = ColumnTypes {
        numeric: count(|d| d.is_numeric()),
        categorical: count(|d| d == DType::Object),
        datetime: count(|d| d == DType::DateTime),
        boolean: count(|d| d == DType::Bool),
    };

    let columns = sample
        .columns()
        .iter()
        .map(|c| {
            let missing = c.missing();
            let missing_pct = if rows == 0 { 0.0 } else { missing as f64 / rows as f64 * 100.0 };
            let profile = ColumnProfile {
                dtype: c.dtype.as_str().to_string(),
                unique_values: c.unique(),
                missing,
                missing_pct,
            };
            (c.name.clone(), profile)
        })
        .collect();

    let numeric_stats = sample
        .columns()
        .iter()
        .filter(|c| c.dtype.is_numeric())
        .filter_map(|c| describe(&c.numeric_values()).map(|d| (c.name.clone(), d)))
        .collect();

    let dtypes: BTreeMap<String, String> = sample
        .columns()
        .iter()
        .map(|c| (c.name.clone(), c.dtype.as_str().to_string()))
        .collect();

    let correlations = (column_types.numeric > 1).then(|| correlations(sample));

    let mut summary = vec![
        format!("Dataset has {} rows and {} columns", dataset_info.rows, dataset_info.columns),
        format!(
            "Column types: {} numeric, {} categorical",
            column_types.numeric, column_types.categorical
        ),
    ];
    if missing_cells > 0 {
        summary.push(format!("Contains {missing_cells} missing values"));
    }

    EdaProfile {
        dataset_info,
        column_types,
        columns,
        numeric_stats,
        column_list: sample.column_names(),
        dtypes,
        correlations,
        summary: summary.join(". "),
    }
}

/// Each unordered pair of numeric columns once, strongest first.
fn correlations(sample: &DatasetSample) -> Vec<Correlation> {
    let numeric: Vec<_> = sample
        .columns()
        .iter()
        .filter(|c| c.dtype.is_numeric())
        .map(|c| (c.name.as_str(), c.numeric_cells()))
        .collect();

    let mut found = Vec::new();
    for (i, (left, x)) in numeric.iter().enumerate() {
        for (right, y) in &numeric[i + 1..] {
            let Some(r) = pearson(x, y) else { continue };
            let r = round_to(r, 2);
            if r.abs() > CORRELATION_THRESHOLD {
                found.push(Correlation { columns: [left.to_string(), right.to_string()], correlation: r });
            }
        }
    }
    found.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastory_common::SAMPLE_ROW_CAP;
    use datastory_test_utils::fixtures::{correlated_sample, sales_sample};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_engineered_correlation_is_reported() {
        let profile = profile(&correlated_sample(100, 0.9));
        let correlations = profile.correlations.unwrap();
        assert_eq!(correlations.len(), 1);
        assert_eq!(correlations[0].columns, ["x".to_string(), "y".to_string()]);
        assert_eq!(correlations[0].correlation, 0.9);
        assert_eq!(profile.dataset_info.rows, 100);
        assert_eq!(profile.column_types.numeric, 3);
        assert_eq!(profile.column_types.categorical, 1);
        assert!(!profile.numeric_stats.contains_key("segment"));
        assert_eq!(profile.columns["segment"].unique_values, 3);
    }

    #[test]
    fn test_single_numeric_column_has_no_correlations() {
        let profile = profile(&sales_sample());
        assert_eq!(profile.correlations, None);
        assert_eq!(profile.column_types.datetime, 1);
        assert_eq!(profile.column_types.categorical, 1);
        assert_eq!(profile.summary, "Dataset has 24 rows and 3 columns. Column types: 1 numeric, 1 categorical");
    }

    #[test]
    fn test_missing_values_in_summary_and_columns() {
        let csv = b"a,b,c\n1,2,x\n,4,y\n3,,\n4,8,x\n";
        let sample = DatasetSample::from_csv(csv, SAMPLE_ROW_CAP).unwrap();
        let profile = profile(&sample);
        assert_eq!(profile.dataset_info.missing_cells, 3);
        assert_eq!(profile.columns["a"].missing, 1);
        assert_eq!(profile.columns["a"].missing_pct, 25.0);
        assert_eq!(profile.columns["c"].unique_values, 2);
        assert!(profile.summary.ends_with("Contains 3 missing values"));
        assert_eq!(profile.numeric_stats["b"].count, 3);
    }

    #[test]
    fn test_negative_correlation_kept_by_magnitude() {
        let csv = b"u,v\n1,10\n2,8\n3,6\n4,4\n5,2\n";
        let sample = DatasetSample::from_csv(csv, SAMPLE_ROW_CAP).unwrap();
        let correlations = profile(&sample).correlations.unwrap();
        assert_eq!(correlations[0].correlation, -1.0);
    }

    #[test]
    fn test_profile_is_deterministic() {
        let sample = correlated_sample(100, 0.9);
        assert_eq!(profile(&sample), profile(&sample));
    }
}
