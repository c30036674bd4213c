use chrono::{DateTime, Utc};
use pidash_core::{MetricFamily, NormalizedMessage, RawValue, TopicId};
use serde_json::Value;

/// Decode a wire payload: JSON when it parses, plain text otherwise.
/// Bare numerals are valid JSON, so `"42.5"` decodes to a number and
/// `"ON"` stays text.
fn decode(payload: &str) -> RawValue {
    match serde_json::from_str::<Value>(payload.trim()) {
        Ok(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                RawValue::Integer(i)
            } else {
                RawValue::Number(n.as_f64().unwrap_or(0.0))
            }
        }
        Ok(Value::String(s)) => RawValue::Text(s),
        Ok(v) => RawValue::Json(v),
        Err(_) => RawValue::Text(payload.to_owned()),
    }
}

/// Tolerant numeric extraction. Objects are read through their `value`
/// field; anything non-numeric collapses to 0.0 rather than NaN.
fn numeric(raw: &RawValue) -> f64 {
    let guard = |n: f64| if n.is_finite() { n } else { 0.0 };
    match raw {
        RawValue::Integer(n) => *n as f64,
        RawValue::Number(n) => guard(*n),
        RawValue::Text(s) => guard(s.trim().parse().unwrap_or(0.0)),
        RawValue::Json(Value::Object(obj)) => match obj.get("value") {
            Some(Value::Number(n)) => guard(n.as_f64().unwrap_or(0.0)),
            Some(Value::String(s)) => guard(s.trim().parse().unwrap_or(0.0)),
            _ => 0.0,
        },
        RawValue::Json(v) => guard(v.as_f64().unwrap_or(0.0)),
    }
}

/// `{d}j {hh}h {mm}m {ss}s`. Days are zero-padded only when `pad_days`
/// is set (the time-sync widget wants the padded form, the uptime widget
/// does not).
fn format_duration(total_secs: u64, pad_days: bool) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    if pad_days {
        format!("{days:02}j {hours:02}h {minutes:02}m {seconds:02}s")
    } else {
        format!("{days}j {hours:02}h {minutes:02}m {seconds:02}s")
    }
}

/// `dd/mm/yyyy HH:MM:SS` display form of an epoch-seconds timestamp.
fn format_epoch(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.format("%d/%m/%Y %H:%M:%S").to_string())
}

/// Numeric families report the parsed number as `raw`, so a text or
/// object payload does not leak through while `formatted` says 0.
fn numeric_raw(raw: RawValue, value: f64) -> RawValue {
    match raw {
        RawValue::Integer(_) | RawValue::Number(_) => raw,
        _ => RawValue::Number(value),
    }
}

fn normalize_uptime(raw: RawValue) -> NormalizedMessage {
    let secs = numeric(&raw).max(0.0) as u64;
    NormalizedMessage::new(secs as i64, format_duration(secs, false))
}

fn normalize_percent(raw: RawValue, unavailable_sentinel: bool) -> NormalizedMessage {
    let value = numeric(&raw);
    if unavailable_sentinel && value == -1.0 {
        return NormalizedMessage::new(numeric_raw(raw, value), "N/A");
    }
    NormalizedMessage::new(numeric_raw(raw, value), format!("{value:.1}%"))
}

fn normalize_temperature(raw: RawValue) -> NormalizedMessage {
    let value = numeric(&raw);
    NormalizedMessage::new(numeric_raw(raw, value), format!("{value:.1}°C"))
}

fn normalize_frequency(raw: RawValue, family: MetricFamily) -> NormalizedMessage {
    let value = numeric(&raw);
    let formatted = match family {
        MetricFamily::CpuFrequency => format!("{value:.2} GHz"),
        _ => format!("{value:.0} MHz"),
    };
    NormalizedMessage::new(numeric_raw(raw, value), formatted)
}

/// Time-sync payloads carry epoch seconds (never milliseconds); the raw
/// timestamp passes through untouched and only the display string is
/// derived. Sync-result objects additionally carry `uptime_seconds` and
/// `stats`.
fn normalize_time(raw: RawValue) -> NormalizedMessage {
    match &raw {
        RawValue::Json(Value::Object(obj)) => {
            let mut msg = NormalizedMessage::new(raw.clone(), raw.coerce_string());
            if let Some(ts) = obj.get("timestamp").and_then(Value::as_i64) {
                if let Some(display) = format_epoch(ts) {
                    msg.formatted = display;
                }
                // The record's raw value is the epoch timestamp, not the
                // whole sync-result envelope.
                msg.raw = RawValue::Integer(ts);
                msg = msg.with_extra("timestamp", Value::from(ts));
            }
            if let Some(uptime) = obj.get("uptime_seconds").and_then(Value::as_u64) {
                msg = msg.with_extra(
                    "uptime_formatted",
                    Value::from(format_duration(uptime, true)),
                );
            }
            if let Some(stats) = obj.get("stats") {
                msg = msg.with_extra("sync_stats", stats.clone());
            }
            msg
        }
        _ => {
            let ts = numeric(&raw) as i64;
            let formatted = format_epoch(ts).unwrap_or_else(|| raw.coerce_string());
            NormalizedMessage::new(raw, formatted).with_extra("timestamp", Value::from(ts))
        }
    }
}

/// Wi-Fi structures pass through with every field preserved; an embedded
/// `timestamp` (epoch seconds or RFC 3339) is reformatted to the display
/// string in place.
fn normalize_wifi(raw: RawValue) -> NormalizedMessage {
    match &raw {
        RawValue::Json(Value::Object(obj)) => {
            let mut fields = obj.clone();
            if let Some(ts) = fields.get("timestamp").cloned() {
                let display = match &ts {
                    Value::Number(n) => n.as_i64().and_then(format_epoch),
                    Value::String(s) => DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|dt| dt.format("%d/%m/%Y %H:%M:%S").to_string()),
                    _ => None,
                };
                if let Some(display) = display {
                    fields.insert("timestamp".into(), Value::from(display));
                }
            }
            let formatted = raw.coerce_string();
            let mut msg = NormalizedMessage::new(raw, formatted);
            msg.extra = fields;
            msg
        }
        _ => {
            let formatted = raw.coerce_string();
            NormalizedMessage::new(raw, formatted)
        }
    }
}

fn normalize_passthrough(raw: RawValue) -> NormalizedMessage {
    let formatted = raw.coerce_string();
    NormalizedMessage::new(raw, formatted)
}

/// Turn a wire payload into a display-ready record for the resolved
/// internal id. Never fails: undecodable input degrades to a text
/// passthrough and the `formatted` field is always populated.
pub fn normalize(id: &TopicId, payload: &str) -> NormalizedMessage {
    let raw = decode(payload);
    match MetricFamily::classify(id) {
        MetricFamily::Uptime => normalize_uptime(raw),
        MetricFamily::CpuCore => normalize_percent(raw, false),
        MetricFamily::Percent => normalize_percent(raw, true),
        MetricFamily::Temperature => normalize_temperature(raw),
        family @ (MetricFamily::CpuFrequency | MetricFamily::GpuFrequency) => {
            normalize_frequency(raw, family)
        }
        MetricFamily::Time => normalize_time(raw),
        MetricFamily::Wifi => normalize_wifi(raw),
        MetricFamily::Broker | MetricFamily::Other => normalize_passthrough(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn norm(id: &str, payload: &str) -> NormalizedMessage {
        normalize(&TopicId::new(id), payload)
    }

    #[test]
    fn uptime_formats_days_unpadded() {
        let msg = norm("system.uptime", "90061");
        assert_eq!(msg.formatted, "1j 01h 01m 01s");
        assert_eq!(msg.raw, RawValue::Integer(90061));
    }

    #[test]
    fn uptime_under_a_day() {
        assert_eq!(norm("system.uptime", "59").formatted, "0j 00h 00m 59s");
        assert_eq!(norm("system.uptime", "3600").formatted, "0j 01h 00m 00s");
    }

    #[test]
    fn cpu_core_percent_one_decimal() {
        assert_eq!(norm("system.cpu.core1", "42.55").formatted, "42.5%");
        assert_eq!(norm("system.cpu.core2", "100").formatted, "100.0%");
    }

    #[test]
    fn percent_sentinel_is_not_available() {
        assert_eq!(norm("system.memory.swap", "-1").formatted, "N/A");
        assert_eq!(norm("system.memory.ram", "63.2").formatted, "63.2%");
        // The sentinel only applies to the memory/swap/disk family.
        assert_eq!(norm("system.cpu.core1", "-1").formatted, "-1.0%");
    }

    #[test]
    fn temperature_one_decimal_celsius() {
        assert_eq!(norm("system.temp.cpu", "42.7").formatted, "42.7°C");
        assert_eq!(norm("system.temp.gpu", "39").formatted, "39.0°C");
    }

    #[test]
    fn frequency_units_differ_per_processor() {
        assert_eq!(norm("system.cpu.frequency", "1.8").formatted, "1.80 GHz");
        assert_eq!(norm("system.gpu.frequency", "500.4").formatted, "500 MHz");
    }

    #[test]
    fn time_scalar_keeps_epoch_seconds() {
        let msg = norm("system.time", "1700000000");
        assert_eq!(msg.raw, RawValue::Integer(1_700_000_000));
        assert_eq!(msg.formatted, "14/11/2023 22:13:20");
        assert_eq!(msg.extra_field("timestamp"), Some(&json!(1_700_000_000)));
    }

    #[test]
    fn time_sync_result_object() {
        let payload = json!({
            "timestamp": 1_700_000_000,
            "uptime_seconds": 90_061,
            "stats": {"offset_ms": 3}
        })
        .to_string();
        let msg = norm("system.time.sync.result", &payload);
        assert_eq!(msg.raw, RawValue::Integer(1_700_000_000));
        assert_eq!(msg.formatted, "14/11/2023 22:13:20");
        assert_eq!(
            msg.extra_field("uptime_formatted"),
            Some(&json!("01j 01h 01m 01s"))
        );
        assert_eq!(msg.extra_field("sync_stats"), Some(&json!({"offset_ms": 3})));
        // Raw timestamp passes through in seconds, never milliseconds.
        assert_eq!(msg.extra_field("timestamp"), Some(&json!(1_700_000_000)));
    }

    #[test]
    fn wifi_structure_passes_through_with_display_timestamp() {
        let payload = json!({
            "clients": 3,
            "ssid": "werkstatt",
            "timestamp": 1_700_000_000
        })
        .to_string();
        let msg = norm("network.wifi.clients", &payload);
        assert_eq!(msg.extra_field("clients"), Some(&json!(3)));
        assert_eq!(msg.extra_field("ssid"), Some(&json!("werkstatt")));
        assert_eq!(
            msg.extra_field("timestamp"),
            Some(&json!("14/11/2023 22:13:20"))
        );
        assert!(!msg.formatted.is_empty());
    }

    #[test]
    fn broker_and_unknown_pass_through() {
        assert_eq!(norm("mqtt.broker.messages.sent", "1234").formatted, "1234");
        let msg = norm("test.result", "PASS");
        assert_eq!(msg.raw, RawValue::Text("PASS".into()));
        assert_eq!(msg.formatted, "PASS");
    }

    #[test]
    fn non_numeric_payload_on_numeric_family_degrades_to_zero() {
        let msg = norm("system.temp.cpu", "garbage");
        assert_eq!(msg.formatted, "0.0°C");
        // Raw follows the tolerant parse; the garbage text is not kept.
        assert_eq!(msg.raw, RawValue::Number(0.0));
        let msg = norm("system.cpu.core3", "");
        assert_eq!(msg.formatted, "0.0%");
        assert_eq!(msg.raw, RawValue::Number(0.0));
    }

    #[test]
    fn object_value_field_is_extracted() {
        let msg = norm("system.temp.cpu", r#"{"value": 51.6, "unit": "C"}"#);
        assert_eq!(msg.formatted, "51.6°C");
        assert_eq!(msg.raw, RawValue::Number(51.6));
    }
}
