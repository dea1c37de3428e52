//! Experimental scattering curves and computed intensity profiles.

use crate::error::{Error, Result};
use std::io::{BufRead, Write};

/// An experimental curve of (q, I, σ) rows, q in Å⁻¹.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScatteringCurve {
    q: Vec<f64>,
    intensity: Vec<f64>,
    sigma: Vec<f64>,
}

impl ScatteringCurve {
    /// Construct from columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the columns differ in length,
    /// fewer than two rows are given, or any σ is non-positive.
    pub fn new(q: Vec<f64>, intensity: Vec<f64>, sigma: Vec<f64>) -> Result<Self> {
        if q.len() != intensity.len() || q.len() != sigma.len() {
            return Err(Error::InvalidInput(
                "curve columns differ in length".into(),
            ));
        }
        if q.len() < 2 {
            return Err(Error::InvalidInput(
                "a usable curve needs at least two rows".into(),
            ));
        }
        if sigma.iter().any(|&sigma| sigma <= 0.0) {
            return Err(Error::InvalidInput(
                "curve contains non-positive uncertainties".into(),
            ));
        }
        Ok(Self {
            q,
            intensity,
            sigma,
        })
    }

    /// Parse a whitespace-separated curve from `reader`, keeping rows with
    /// q inside `[q_min, q_max]` (after unit conversion).
    ///
    /// Rows need at least three numeric columns; comment and header lines
    /// are skipped. If a header mentions `[nm^-1]`, or the parsed q values
    /// exceed 1, q is taken to be in nm⁻¹ and divided by 10. Rows with
    /// non-positive σ are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when fewer than two usable rows
    /// remain, or on I/O failure.
    pub fn from_reader<R: BufRead>(reader: R, q_min: f64, q_max: f64) -> Result<Self> {
        let mut rows: Vec<(f64, f64, f64)> = Vec::new();
        let mut nm_units = false;
        for line in reader.lines() {
            let line =
                line.map_err(|err| Error::InvalidInput(format!("cannot read curve: {err}")))?;
            let trimmed = line.trim();
            if trimmed.contains("[nm^-1]") {
                nm_units = true;
            }
            let mut columns = trimmed.split_whitespace().map(str::parse::<f64>);
            let (Some(Ok(q)), Some(Ok(intensity)), Some(Ok(sigma))) =
                (columns.next(), columns.next(), columns.next())
            else {
                // header, comment or malformed row
                continue;
            };
            if !(q.is_finite() && intensity.is_finite() && sigma.is_finite()) {
                continue;
            }
            rows.push((q, intensity, sigma));
        }

        if !nm_units && rows.iter().any(|&(q, ..)| q > 1.0) {
            nm_units = true;
        }
        if nm_units {
            for row in &mut rows {
                row.0 /= 10.0;
            }
        }
        rows.retain(|&(q, _, sigma)| q >= q_min && q <= q_max && sigma > 0.0);

        let q: Vec<f64> = rows.iter().map(|row| row.0).collect();
        let intensity: Vec<f64> = rows.iter().map(|row| row.1).collect();
        let sigma: Vec<f64> = rows.iter().map(|row| row.2).collect();
        Self::new(q, intensity, sigma)
    }

    /// Write the curve as one `q I σ` row per line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] on I/O failure.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        (|| -> std::io::Result<()> {
            writeln!(writer, "# q I sigma")?;
            for index in 0..self.len() {
                writeln!(
                    writer,
                    "{:.8e} {:.8e} {:.8e}",
                    self.q[index], self.intensity[index], self.sigma[index]
                )?;
            }
            Ok(())
        })()
        .map_err(|err| Error::Other(err.into()))
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.q.len()
    }

    /// Whether the curve holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    /// The q column, in Å⁻¹.
    #[must_use]
    pub fn q(&self) -> &[f64] {
        &self.q
    }

    /// The intensity column.
    #[must_use]
    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    /// The uncertainty column.
    #[must_use]
    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }

    /// Unweighted mean intensity.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.intensity.iter().sum::<f64>() / self.len() as f64
    }

    /// Inverse-variance weighted mean intensity.
    #[must_use]
    pub fn weighted_mean(&self) -> f64 {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (intensity, sigma) in self.intensity.iter().zip(&self.sigma) {
            let weight = 1.0 / (sigma * sigma);
            numerator += intensity * weight;
            denominator += weight;
        }
        numerator / denominator
    }

    /// Sample standard deviation of the intensities.
    #[must_use]
    pub fn std(&self) -> f64 {
        let mean = self.mean();
        let variance = self
            .intensity
            .iter()
            .map(|intensity| (intensity - mean).powi(2))
            .sum::<f64>()
            / (self.len() - 1) as f64;
        variance.sqrt()
    }

    /// A copy reduced to roughly `target` rows by averaging consecutive
    /// runs. Oversampled detector curves carry strongly correlated
    /// neighbors, so averaging loses no information the fit can use.
    #[must_use]
    pub fn reduced(&self, target: usize) -> Self {
        if target == 0 || self.len() <= target {
            return self.clone();
        }
        let stride = self.len().div_ceil(target);
        let mut q = Vec::new();
        let mut intensity = Vec::new();
        let mut sigma = Vec::new();
        for chunk_start in (0..self.len()).step_by(stride) {
            let chunk = chunk_start..(chunk_start + stride).min(self.len());
            let n = chunk.len() as f64;
            q.push(chunk.clone().map(|i| self.q[i]).sum::<f64>() / n);
            intensity.push(chunk.clone().map(|i| self.intensity[i]).sum::<f64>() / n);
            // averaging n rows shrinks the uncertainty by √n
            let mean_sigma = chunk.clone().map(|i| self.sigma[i]).sum::<f64>() / n;
            sigma.push(mean_sigma / n.sqrt());
        }
        Self {
            q,
            intensity,
            sigma,
        }
    }
}

/// A computed intensity profile I(q) on the model q sampling.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScatteringProfile {
    q: Vec<f64>,
    intensity: Vec<f64>,
}

impl ScatteringProfile {
    /// Construct from columns.
    ///
    /// # Panics
    ///
    /// Panics if the columns differ in length.
    #[must_use]
    pub fn new(q: Vec<f64>, intensity: Vec<f64>) -> Self {
        assert_eq!(q.len(), intensity.len());
        Self { q, intensity }
    }

    /// The q sampling, in Å⁻¹.
    #[must_use]
    pub fn q(&self) -> &[f64] {
        &self.q
    }

    /// The intensities.
    #[must_use]
    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    /// Add another profile, point by point.
    ///
    /// # Panics
    ///
    /// Panics if the samplings differ.
    pub fn add(&mut self, other: &Self) {
        assert_eq!(self.q, other.q);
        for (intensity, other) in self.intensity.iter_mut().zip(&other.intensity) {
            *intensity += other;
        }
    }

    /// Piecewise-linear interpolation at `q`, clamped to the profile ends.
    #[must_use]
    pub fn interpolate(&self, q: f64) -> f64 {
        match self.q.partition_point(|&node| node < q) {
            0 => self.intensity[0],
            index if index == self.q.len() => self.intensity[self.q.len() - 1],
            index => {
                let (q0, q1) = (self.q[index - 1], self.q[index]);
                let (i0, i1) = (self.intensity[index - 1], self.intensity[index]);
                i0 + (i1 - i0) * (q - q0) / (q1 - q0)
            }
        }
    }

    /// Interpolate onto an experimental q sampling.
    #[must_use]
    pub fn spliced(&self, q: &[f64]) -> Vec<f64> {
        q.iter().map(|&q| self.interpolate(q)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::assert_approx_eq;
    use std::io::Cursor;

    #[test]
    fn parse_skips_headers_and_bad_rows() {
        let text = "# a header line\nq I sigma\n0.01 10.0 0.1\n0.02 9.0 0.1\nnot a row\n0.03 8.0 -1.0\n0.04 7.0 0.2\n";
        let curve = ScatteringCurve::from_reader(Cursor::new(text), 1e-4, 0.5).unwrap();
        assert_eq!(curve.len(), 3);
        assert_approx_eq!(f64, curve.q()[2], 0.04);
    }

    #[test]
    fn nm_units_are_detected_from_values() {
        // q up to 10 only makes sense in nm⁻¹
        let text = "1.0 5.0 0.1\n5.0 4.0 0.1\n10.0 3.0 0.1\n";
        let curve = ScatteringCurve::from_reader(Cursor::new(text), 1e-4, 1.0).unwrap();
        assert_eq!(curve.len(), 3);
        assert_approx_eq!(f64, curve.q()[0], 0.1);
        assert_approx_eq!(f64, curve.q()[2], 1.0);
    }

    #[test]
    fn nm_units_are_detected_from_header() {
        let text = "# q [nm^-1] I err\n0.1 5.0 0.1\n0.2 4.0 0.1\n";
        let curve = ScatteringCurve::from_reader(Cursor::new(text), 1e-4, 0.5).unwrap();
        assert_approx_eq!(f64, curve.q()[0], 0.01);
        assert_approx_eq!(f64, curve.q()[1], 0.02);
    }

    #[test]
    fn too_few_rows_is_an_error() {
        let text = "0.01 10.0 0.1\n";
        assert!(ScatteringCurve::from_reader(Cursor::new(text), 1e-4, 0.5).is_err());
    }

    #[test]
    fn save_load_roundtrip() {
        let curve = ScatteringCurve::new(
            vec![0.01, 0.02, 0.3],
            vec![10.0, 5.5, 0.25],
            vec![0.1, 0.2, 0.01],
        )
        .unwrap();
        let mut buffer = Vec::new();
        curve.save(&mut buffer).unwrap();
        let reloaded = ScatteringCurve::from_reader(Cursor::new(buffer), 1e-4, 0.5).unwrap();
        for index in 0..curve.len() {
            assert_approx_eq!(f64, reloaded.q()[index], curve.q()[index], epsilon = 1e-9);
            assert_approx_eq!(
                f64,
                reloaded.intensity()[index],
                curve.intensity()[index],
                epsilon = 1e-9
            );
            assert_approx_eq!(f64, reloaded.sigma()[index], curve.sigma()[index], epsilon = 1e-9);
        }
    }

    #[test]
    fn statistics() {
        let curve =
            ScatteringCurve::new(vec![0.1, 0.2], vec![1.0, 3.0], vec![0.1, 0.2]).unwrap();
        assert_approx_eq!(f64, curve.mean(), 2.0);
        assert!(curve.weighted_mean() < 2.0); // the tighter row dominates
        assert_approx_eq!(f64, curve.std(), 2.0_f64.sqrt());
    }

    #[test]
    fn reduction_averages_runs() {
        let n = 100;
        let curve = ScatteringCurve::new(
            (0..n).map(|i| 0.01 * f64::from(i)).collect(),
            vec![2.0; n as usize],
            vec![0.1; n as usize],
        )
        .unwrap();
        let reduced = curve.reduced(25);
        assert_eq!(reduced.len(), 25);
        assert_approx_eq!(f64, reduced.intensity()[0], 2.0);
        assert_approx_eq!(f64, reduced.sigma()[0], 0.1 / 2.0);
    }

    #[test]
    fn interpolation_is_exact_on_nodes_and_linear_between() {
        let profile = ScatteringProfile::new(vec![0.0, 1.0, 2.0], vec![0.0, 10.0, 0.0]);
        assert_approx_eq!(f64, profile.interpolate(1.0), 10.0);
        assert_approx_eq!(f64, profile.interpolate(0.5), 5.0);
        assert_approx_eq!(f64, profile.interpolate(1.5), 5.0);
        // clamped outside
        assert_approx_eq!(f64, profile.interpolate(-1.0), 0.0);
        assert_approx_eq!(f64, profile.interpolate(3.0), 0.0);
    }
}
