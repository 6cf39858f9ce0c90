use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{BinConvention, Column, Frequency, ObservationSeries, ResampledTable};
use crate::processors::period_index::PeriodIndex;
use crate::utils::constants::{CARBON_UPTAKE_COLUMN, DEGREE_DAYS_COLUMN, DEGREE_DAYS_RANGE_COLUMN};

const SECONDS_PER_DAY: f64 = 86_400.0;

pub const PEAK_DAYFRAC_SUFFIX: &str = "_peak_dayfrac";

/// Half-hourly column of hours with net carbon uptake: 0.5 where the net
/// flux is negative, 0 where it is not, missing where the flux is missing
pub fn carbon_uptake_hours(series: &ObservationSeries, net_flux: &str) -> Result<Column> {
    let hours_per_step = series.step().num_seconds() as f64 / 3600.0;
    let values = series
        .values(net_flux)?
        .iter()
        .map(|v| {
            if v.is_nan() {
                f64::NAN
            } else if *v < 0.0 {
                hours_per_step
            } else {
                0.0
            }
        })
        .collect();

    Ok(Column::new(CARBON_UPTAKE_COLUMN, values))
}

/// Degree days from a daily table's min and max temperature columns.
///
/// `degree_days` is the mean of min and max above `base`, floored at zero;
/// `degree_days_range` is half the diurnal range.
pub fn degree_days(
    daily: &ResampledTable,
    tmin_column: &str,
    tmax_column: &str,
    base: f64,
) -> Result<(Column, Column)> {
    let tmin = daily.values(tmin_column)?;
    let tmax = daily.values(tmax_column)?;

    let above_base = tmin
        .iter()
        .zip(tmax)
        .map(|(lo, hi)| {
            let above = (hi + lo) / 2.0 - base;
            if above.is_nan() {
                f64::NAN
            } else {
                above.max(0.0)
            }
        })
        .collect();
    let range = tmin.iter().zip(tmax).map(|(lo, hi)| (hi - lo) / 2.0).collect();

    Ok((
        Column::new(DEGREE_DAYS_COLUMN, above_base),
        Column::new(DEGREE_DAYS_RANGE_COLUMN, range),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extremum {
    Max,
    Min,
}

/// Daily table with the time of the daily peak of `variable`, as a fraction
/// of the day measured from the start of the day bin. The first occurrence
/// wins; a day with no values is missing.
pub fn peak_dayfrac(
    series: &ObservationSeries,
    variable: &str,
    extremum: Extremum,
    convention: BinConvention,
) -> Result<ResampledTable> {
    let values = series.values(variable)?;
    let bins = PeriodIndex::from_timestamps(series.index(), series.step(), Frequency::Daily, convention)?;

    let fractions = bins
        .periods()
        .iter()
        .zip(bins.ranges())
        .map(|(day, range)| {
            let mut best: Option<usize> = None;
            for row in range.clone() {
                let v = values[row];
                if v.is_nan() {
                    continue;
                }
                let better = match (best, extremum) {
                    (None, _) => true,
                    (Some(b), Extremum::Max) => v > values[b],
                    (Some(b), Extremum::Min) => v < values[b],
                };
                if better {
                    best = Some(row);
                }
            }

            match (best, day.and_hms_opt(0, 0, 0)) {
                (Some(row), Some(day_start)) => {
                    (series.index()[row] - day_start).num_seconds() as f64 / SECONDS_PER_DAY
                }
                _ => f64::NAN,
            }
        })
        .collect();

    ResampledTable::new(
        series.site(),
        Frequency::Daily,
        bins.periods().to_vec(),
        vec![Column::new(format!("{}{}", variable, PEAK_DAYFRAC_SUFFIX), fractions)],
    )
}

/// Element-wise ratio of two columns; a zero denominator gives missing
pub fn ratio(
    table: &ResampledTable,
    numerator: &str,
    denominator: &str,
    name: &str,
) -> Result<Column> {
    let num = table.values(numerator)?;
    let den = table.values(denominator)?;

    let values = num
        .iter()
        .zip(den)
        .map(|(n, d)| if *d == 0.0 { f64::NAN } else { n / d })
        .collect();
    Ok(Column::new(name, values))
}
