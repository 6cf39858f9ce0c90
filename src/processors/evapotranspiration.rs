use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Column, EtInputs, ObservationSeries};
use crate::processors::period_index::{Aggregation, PeriodIndex};
use crate::utils::constants::{
    DAYTIME_SW_THRESHOLD, ET_COLUMN, HALF_HOUR_SECONDS_F64, PET_COLUMN, PRIESTLEY_TAYLOR_ALPHA,
    PSYCHROMETRIC_CONSTANT,
};

/// True where incoming shortwave exceeds the daytime threshold.
/// Missing radiation counts as night.
pub fn daytime_mask(shortwave: &[f64]) -> Vec<bool> {
    shortwave
        .iter()
        .map(|sw| *sw > DAYTIME_SW_THRESHOLD)
        .collect()
}

/// Latent heat of vaporization, from air temperature in deg C
pub fn latent_heat_of_vaporization(air_temperature: f64) -> f64 {
    (2.501 - 0.00236 * air_temperature) * 1000.0
}

/// Slope of the saturation vapour pressure curve (kPa/deg C)
pub fn saturation_slope(air_temperature: f64) -> f64 {
    let t = air_temperature + 237.3;
    (2508.3 / (t * t)) * (17.3 * air_temperature / t).exp()
}

/// Priestley-Taylor potential latent heat flux, with H + LE standing in for
/// available energy
pub fn potential_latent_heat(sensible_heat: f64, latent_heat: f64, air_temperature: f64) -> f64 {
    let delta = saturation_slope(air_temperature);
    PRIESTLEY_TAYLOR_ALPHA * (delta * (sensible_heat + latent_heat) / (delta + PSYCHROMETRIC_CONSTANT))
}

/// Per-period intermediate values of the ET calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtSummary {
    pub period: NaiveDate,
    pub daytime_obs: f64,
    pub le_mean: f64,
    pub tair_mean: f64,
    pub h_mean: f64,
    pub lambda: f64,
    pub et_mm: f64,
    pub pet_mm: f64,
}

impl EtSummary {
    fn new(period: NaiveDate, daytime_obs: f64, le_mean: f64, tair_mean: f64, h_mean: f64) -> Self {
        let lambda = latent_heat_of_vaporization(tair_mean);
        let seconds = daytime_obs * HALF_HOUR_SECONDS_F64;
        let et_mm = le_mean * seconds / (lambda * 1000.0);
        let pet_mm = potential_latent_heat(h_mean, le_mean, tair_mean) * seconds / (1000.0 * lambda);

        Self {
            period,
            daytime_obs,
            le_mean,
            tair_mean,
            h_mean,
            lambda,
            et_mm,
            pet_mm,
        }
    }
}

/// Daytime-restricted ET and PET from latent heat flux
pub struct EtCalculator<'a> {
    inputs: &'a EtInputs,
}

impl<'a> EtCalculator<'a> {
    pub fn new(inputs: &'a EtInputs) -> Self {
        Self { inputs }
    }

    /// Variables the calculation reads besides the latent heat columns
    pub fn required_inputs(&self) -> [&str; 3] {
        [
            self.inputs.air_temperature.as_str(),
            self.inputs.shortwave_in.as_str(),
            self.inputs.sensible_heat.as_str(),
        ]
    }

    /// Period summaries for one latent heat variable. LE and air
    /// temperature are blanked outside daytime; H is averaged over the
    /// whole period.
    pub fn summarize(
        &self,
        series: &ObservationSeries,
        latent_heat: &str,
        bins: &PeriodIndex,
    ) -> Result<Vec<EtSummary>> {
        let le = series.values(latent_heat)?;
        let tair = series.values(&self.inputs.air_temperature)?;
        let sw = series.values(&self.inputs.shortwave_in)?;
        let h = series.values(&self.inputs.sensible_heat)?;

        let daytime = daytime_mask(sw);
        let blank = |values: &[f64]| -> Vec<f64> {
            values
                .iter()
                .zip(&daytime)
                .map(|(v, day)| if *day { *v } else { f64::NAN })
                .collect()
        };
        let le_day = blank(le);
        let tair_day = blank(tair);
        let counter: Vec<f64> = daytime.iter().map(|d| if *d { 1.0 } else { 0.0 }).collect();

        let le_mean = bins.reduce(&le_day, Aggregation::Mean);
        let tair_mean = bins.reduce(&tair_day, Aggregation::Mean);
        let h_mean = bins.reduce(h, Aggregation::Mean);
        let daytime_obs = bins.reduce(&counter, Aggregation::Sum);

        Ok(bins
            .periods()
            .iter()
            .enumerate()
            .map(|(i, period)| EtSummary::new(*period, daytime_obs[i], le_mean[i], tair_mean[i], h_mean[i]))
            .collect())
    }

    /// `ET_mm_dayint` and `PET_mm_dayint` columns for each latent heat
    /// variable. Names get a `_<var>` suffix only when there is more than one.
    pub fn columns<S: AsRef<str>>(
        &self,
        series: &ObservationSeries,
        latent_heat: &[S],
        bins: &PeriodIndex,
    ) -> Result<Vec<Column>> {
        let mut columns = Vec::with_capacity(latent_heat.len() * 2);

        for var in latent_heat {
            let var = var.as_ref();
            let summaries = self.summarize(series, var, bins)?;
            let (et_name, pet_name) = if latent_heat.len() > 1 {
                (format!("{}_{}", ET_COLUMN, var), format!("{}_{}", PET_COLUMN, var))
            } else {
                (ET_COLUMN.to_string(), PET_COLUMN.to_string())
            };

            columns.push(Column::new(et_name, summaries.iter().map(|s| s.et_mm).collect()));
            columns.push(Column::new(pet_name, summaries.iter().map(|s| s.pet_mm).collect()));
        }

        Ok(columns)
    }
}
