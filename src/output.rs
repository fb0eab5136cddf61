use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::sweep::SweepResult;

/// Default output filename, stamped with the local date.
pub fn default_csv_name() -> String {
    format!("sweep_{}.csv", chrono::Local::now().format("%Y-%m-%d"))
}

/// Writes one `<wavelength>, <power>` row per logged sample: wavelength in
/// scientific notation, power in plain decimal, no header row.
pub fn write_csv(path: impl AsRef<Path>, result: &SweepResult) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (wavelength, power) in result.wavelength_m.iter().zip(&result.power) {
        writeln!(out, "{:E}, {}", wavelength, power)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn result_with(wavelength_m: Vec<f64>, power: Vec<f32>) -> SweepResult {
        SweepResult {
            points: wavelength_m.len(),
            wavelength_m,
            power,
            tls_errors: Vec::new(),
            pm_errors: Vec::new(),
        }
    }

    #[test]
    fn test_csv_round_trip() {
        let result = result_with(
            vec![1.25e-6, 1.2501e-6, 1.2502e-6],
            vec![1.5e-3, 1.6e-3, -4.0e-6],
        );
        let path = std::env::temp_dir().join(format!(
            "lambdascan_round_trip_{}.csv",
            std::process::id()
        ));

        write_csv(&path, &result).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let _ = fs::remove_file(&path);

        let rows: Vec<&str> = contents.lines().collect();
        assert_eq!(rows.len(), result.points);
        for (i, row) in rows.iter().enumerate() {
            let (wavelength, power) = row.split_once(", ").unwrap();
            assert_eq!(wavelength.parse::<f64>().unwrap(), result.wavelength_m[i]);
            assert_eq!(power.parse::<f32>().unwrap(), result.power[i]);
        }
    }

    #[test]
    fn test_wavelength_column_is_scientific() {
        let result = result_with(vec![1.25e-6], vec![1.0e-3]);
        let path = std::env::temp_dir().join(format!(
            "lambdascan_notation_{}.csv",
            std::process::id()
        ));

        write_csv(&path, &result).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert!(contents.starts_with("1.25E-6, "));
    }

    #[test]
    fn test_write_failure_maps_to_the_output_error_kind() {
        let result = result_with(vec![1.25e-6], vec![1.0e-3]);
        let missing = Path::new("/nonexistent-lambdascan-dir/out.csv");
        let err = write_csv(missing, &result).unwrap_err();
        assert!(matches!(
            crate::sweep::SweepError::from(err),
            crate::sweep::SweepError::Output(_)
        ));
    }

    #[test]
    fn test_default_csv_name() {
        let name = default_csv_name();
        assert!(name.starts_with("sweep_"));
        assert!(name.ends_with(".csv"));
    }
}
