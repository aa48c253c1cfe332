//! Conversion between domain values and generic core rows

use std::collections::BTreeMap;

use hapi_model::{Asset, CoreRow, CoreTable, IntervalJob, PinMode, SequenceStep, Site};
use serde_json::{json, Value};

use crate::schema::table_spec;

/// Key string of a row: key column values joined with `/`
pub(crate) fn row_key(table: CoreTable, values: &BTreeMap<String, Value>) -> String {
    table_spec(table)
        .keys
        .iter()
        .map(|c| match values.get(c.name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Unstamped row; the store fills in `updated_at` and `origin` on save
fn unstamped(table: CoreTable, values: BTreeMap<String, Value>) -> CoreRow {
    CoreRow {
        key: row_key(table, &values),
        table,
        values,
        updated_at: 0,
        origin: String::new(),
    }
}

fn map(pairs: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub(crate) fn site_row(site: &Site) -> CoreRow {
    unstamped(
        CoreTable::Site,
        map(vec![
            ("site_id", json!(site.site_id)),
            ("name", json!(site.name)),
            ("operator", json!(site.operator)),
            ("email", json!(site.email)),
            ("phone", json!(site.phone)),
            ("location", json!(site.location)),
            ("net_iface", json!(site.net_iface)),
        ]),
    )
}

pub(crate) fn job_row(job: &IntervalJob) -> CoreRow {
    unstamped(
        CoreTable::IntervalSchedule,
        map(vec![
            ("job_id", json!(job.job_id)),
            ("job_name", json!(job.job_name)),
            ("rtuid", json!(job.rtuid)),
            ("command", json!(job.target.command())),
            ("sequence", json!(job.target.sequence())),
            ("kind", json!(job.kind.as_str())),
            ("time_unit", json!(job.time_unit.as_str())),
            ("interval", json!(job.interval)),
            ("at_time", json!(job.at_time)),
            ("enabled", json!(i64::from(job.enabled))),
            ("timeout", json!(job.timeout_secs)),
        ]),
    )
}

pub(crate) fn step_row(step: &SequenceStep) -> CoreRow {
    unstamped(
        CoreTable::Sequence,
        map(vec![
            ("name", json!(step.name)),
            ("step", json!(step.step)),
            ("step_name", json!(step.step_name)),
            ("command", json!(step.command)),
            ("timeout", json!(step.timeout_secs)),
        ]),
    )
}

pub(crate) fn pin_row(rtuid: &str, mode: &PinMode) -> CoreRow {
    unstamped(
        CoreTable::Pins,
        map(vec![
            ("rtuid", json!(rtuid)),
            ("pin", json!(mode.pin)),
            ("mode", json!(mode.mode)),
            ("def_value", json!(mode.default_value)),
            ("pos", json!(mode.pos)),
        ]),
    )
}

pub(crate) fn asset_row(asset: &Asset) -> CoreRow {
    unstamped(
        CoreTable::Assets,
        map(vec![
            ("asset_id", json!(asset.asset_id)),
            ("rtuid", json!(asset.rtuid)),
            ("abbreviation", json!(asset.abbreviation)),
            ("name", json!(asset.name)),
            ("pin", json!(asset.pin)),
            ("unit", json!(asset.unit)),
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key() {
        let mode = PinMode {
            pin: "D3".into(),
            mode: "1".into(),
            default_value: "0".into(),
            pos: 0,
        };
        let row = pin_row("RTU1", &mode);
        assert_eq!(row.key, "RTU1/D3");
        assert_eq!(row.table, CoreTable::Pins);
    }
}
