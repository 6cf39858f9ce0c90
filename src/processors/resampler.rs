use tracing::debug;

use crate::error::Result;
use crate::models::{
    BinConvention, Column, EtInputs, Frequency, ObservationSeries, ResampledTable, VariableGroups,
};
use crate::processors::evapotranspiration::EtCalculator;
use crate::processors::period_index::{Aggregation, PeriodIndex};
use crate::utils::constants::{CARBON_MOLAR_MASS, HALF_HOUR_SECONDS_F64, MICRO};

/// umol CO2 m-2 s-1 to g C m-2 per half hour
pub const CARBON_FACTOR: f64 = CARBON_MOLAR_MASS * MICRO * HALF_HOUR_SECONDS_F64;

/// Resamples half-hourly series to daily, monthly or annual tables,
/// applying each variable group's transform
#[derive(Debug, Clone, Default)]
pub struct Resampler {
    bin_convention: BinConvention,
    et_inputs: EtInputs,
}

impl Resampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bin_convention(mut self, bin_convention: BinConvention) -> Self {
        self.bin_convention = bin_convention;
        self
    }

    pub fn with_et_inputs(mut self, et_inputs: EtInputs) -> Self {
        self.et_inputs = et_inputs;
        self
    }

    pub fn bin_convention(&self) -> BinConvention {
        self.bin_convention
    }

    /// Period index of `series` at `frequency` under this resampler's binning
    pub fn periods(&self, series: &ObservationSeries, frequency: Frequency) -> Result<PeriodIndex> {
        PeriodIndex::from_timestamps(series.index(), series.step(), frequency, self.bin_convention)
    }

    /// Resample `series` to one row per period.
    ///
    /// Every requested variable must exist in the series, and no variable
    /// may appear in two groups. Output columns follow group order:
    /// carbon fluxes, ET/PET, averages, min/max, sums, integrals.
    pub fn resample(
        &self,
        series: &ObservationSeries,
        frequency: Frequency,
        groups: &VariableGroups,
    ) -> Result<ResampledTable> {
        groups.validate_disjoint()?;
        let requested: Vec<&str> = groups.assignments().into_iter().map(|(_, v)| v).collect();
        series.require_columns(&requested)?;

        let et = EtCalculator::new(&self.et_inputs);
        if !groups.latent_heat.is_empty() {
            series.require_columns(&et.required_inputs())?;
        }

        let bins = self.periods(series, frequency)?;
        let mut columns = Vec::new();

        for var in &groups.carbon_fluxes {
            let grams: Vec<f64> = series.values(var)?.iter().map(|v| v * CARBON_FACTOR).collect();
            columns.push(Column::new(
                format!("{}_g_int", var),
                bins.reduce(&grams, Aggregation::Sum),
            ));
        }

        columns.extend(et.columns(series, &groups.latent_heat, &bins)?);

        for var in &groups.averages {
            columns.push(Column::new(
                format!("{}_avg", var),
                bins.reduce(series.values(var)?, Aggregation::Mean),
            ));
        }

        for var in &groups.min_max {
            let values = series.values(var)?;
            columns.push(Column::new(format!("{}_min", var), bins.reduce(values, Aggregation::Min)));
            columns.push(Column::new(format!("{}_max", var), bins.reduce(values, Aggregation::Max)));
        }

        for var in &groups.sums {
            columns.push(Column::new(
                format!("{}_sum", var),
                bins.reduce(series.values(var)?, Aggregation::Sum),
            ));
        }

        for var in &groups.integrals {
            let integrated: Vec<f64> = series
                .values(var)?
                .iter()
                .map(|v| v * HALF_HOUR_SECONDS_F64)
                .collect();
            columns.push(Column::new(
                format!("{}_int", var),
                bins.reduce(&integrated, Aggregation::Sum),
            ));
        }

        debug!(
            site = series.site(),
            %frequency,
            periods = bins.len(),
            columns = columns.len(),
            "resampled"
        );

        ResampledTable::new(series.site(), frequency, bins.periods().to_vec(), columns)
    }

    /// Roll a table up to a coarser frequency, e.g. daily sums to monthly
    /// sums. Rolled columns take the reduction's suffix, so daily
    /// `degree_days` summed by month becomes `degree_days_sum`.
    pub fn rollup<S: AsRef<str>>(
        &self,
        table: &ResampledTable,
        frequency: Frequency,
        aggregation: Aggregation,
        columns: &[S],
    ) -> Result<ResampledTable> {
        let bins = PeriodIndex::from_dates(table.index(), frequency)?;

        let rolled = columns
            .iter()
            .map(|name| {
                let values = table.values(name.as_ref())?;
                Ok(Column::new(
                    format!("{}{}", name.as_ref(), aggregation.suffix()),
                    bins.reduce(values, aggregation),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        ResampledTable::new(table.site(), frequency, bins.periods().to_vec(), rolled)
    }
}
