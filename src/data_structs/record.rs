use std::str::FromStr;

/// Number of whitespace-separated fields of a bedMethyl row.
pub const BEDMETHYL_FIELDS: usize = 18;

const CHR_FIELD: usize = 0;
const START_FIELD: usize = 1;
const END_FIELD: usize = 2;
const NAME_FIELD: usize = 3;
const DEPTH_FIELD: usize = 4;
const MODIFIED_FIELD: usize = 11;

/// One bedMethyl row, restricted to the fields the store keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalRecord {
    pub chr:           String,
    pub start:         u32,
    pub end:           u32,
    pub name:          String,
    pub depth:         u32,
    pub modifications: u32,
}

impl IntervalRecord {
    /// Percentage of modified reads, `None` when the locus has no coverage.
    pub fn fraction(&self) -> Option<f64> {
        if self.depth == 0 {
            None
        }
        else {
            Some(self.modifications as f64 / self.depth as f64 * 100.0)
        }
    }

    /// Parses a row. `strict` additionally requires the full 18-field
    /// layout; ingestion only needs the consumed fields to be present.
    pub fn parse_line(
        line: &str,
        strict: bool,
    ) -> Result<Self, String> {
        let fields = line.split_ascii_whitespace().collect::<Vec<_>>();
        if strict && fields.len() != BEDMETHYL_FIELDS {
            return Err(format!(
                "expected {} fields, found {}",
                BEDMETHYL_FIELDS,
                fields.len()
            ));
        }
        if fields.len() <= MODIFIED_FIELD {
            return Err(format!(
                "expected at least {} fields, found {}",
                MODIFIED_FIELD + 1,
                fields.len()
            ));
        }

        let record = Self {
            chr:           fields[CHR_FIELD].to_string(),
            start:         parse_field(&fields, START_FIELD, "start")?,
            end:           parse_field(&fields, END_FIELD, "end")?,
            name:          fields[NAME_FIELD].to_string(),
            depth:         parse_field(&fields, DEPTH_FIELD, "read depth")?,
            modifications: parse_field(&fields, MODIFIED_FIELD, "modification count")?,
        };

        if record.end < record.start {
            return Err(format!(
                "end {} is smaller than start {}",
                record.end, record.start
            ));
        }
        if record.modifications > record.depth {
            return Err(format!(
                "modification count {} exceeds read depth {}",
                record.modifications, record.depth
            ));
        }
        Ok(record)
    }
}

fn parse_field<T: FromStr>(
    fields: &[&str],
    idx: usize,
    label: &str,
) -> Result<T, String> {
    fields[idx]
        .parse::<T>()
        .map_err(|_| format!("field {} ({}) is not a valid integer: '{}'", idx, label, fields[idx]))
}
