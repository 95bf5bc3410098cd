//! Readers for fields nested inside array items.
//!
//! Errors land on the top-level `field` but name the full `path.key`, so a
//! caller sees `jobs[0][1].duration` rather than just `jobs`.

use millkit_kernel::{MAX_MAGNITUDE, ParamReader, in_numeric_range};
use serde_json::Value;

/// A finite, non-negative number under `item[key]`, reported as `path.key`.
pub(crate) fn nested_number(
    params: &mut ParamReader<'_>,
    field: &str,
    item: &Value,
    key: &str,
    path: &str,
) -> Option<f64> {
    match item.get(key).and_then(Value::as_f64) {
        Some(x) if in_numeric_range(x) && x >= 0.0 => Some(x),
        Some(_) => {
            params.error(
                field,
                format!("{path}.{key} must be a non-negative number up to {MAX_MAGNITUDE:e}"),
            );
            None
        }
        None => {
            params.error(field, format!("{path}.{key} is required"));
            None
        }
    }
}

/// An index below `limit` under `item[key]`, reported as `path.key`.
pub(crate) fn nested_index(
    params: &mut ParamReader<'_>,
    field: &str,
    item: &Value,
    key: &str,
    path: &str,
    limit: usize,
) -> Option<usize> {
    match item.get(key).and_then(Value::as_u64) {
        Some(i) => match usize::try_from(i) {
            Ok(i) if i < limit => Some(i),
            _ => {
                params.error(field, format!("{path}.{key} {i} is out of range (limit {limit})"));
                None
            }
        },
        None => {
            params.error(field, format!("{path}.{key} must be a non-negative integer"));
            None
        }
    }
}

/// Strings under `item[key]`, or `None` with an error recorded.
pub(crate) fn nested_strings(
    params: &mut ParamReader<'_>,
    field: &str,
    item: &Value,
    key: &str,
    path: &str,
) -> Option<Vec<String>> {
    let strings: Option<Vec<String>> = item.get(key).and_then(Value::as_array).and_then(|items| {
        items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    });
    if strings.is_none() {
        params.error(field, format!("{path}.{key} must be an array of strings"));
    }
    strings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::params;
    use serde_json::json;

    #[test]
    fn nested_reads_report_the_path() {
        let p = params(json!({}));
        let mut reader = ParamReader::new(&p);
        let item = json!({"machine": 2, "duration": -1.0, "tags": ["a", 3]});
        assert_eq!(
            nested_index(&mut reader, "jobs", &item, "machine", "jobs[0][1]", 3),
            Some(2)
        );
        assert_eq!(
            nested_index(&mut reader, "jobs", &item, "machine", "jobs[0][1]", 2),
            None
        );
        assert_eq!(nested_number(&mut reader, "jobs", &item, "duration", "jobs[0][1]"), None);
        assert_eq!(nested_strings(&mut reader, "jobs", &item, "tags", "jobs[0][1]"), None);
        let messages: Vec<&str> = reader.issues().iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "jobs[0][1].machine 2 is out of range (limit 2)",
                "jobs[0][1].duration must be a non-negative number up to 1e12",
                "jobs[0][1].tags must be an array of strings"
            ]
        );
    }
}
