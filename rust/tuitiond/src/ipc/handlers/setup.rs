use crate::db;
use crate::fees::generator::HARD_CAP_PERIODS;
use crate::fees::{FeeConfig, FEES_SETTINGS_KEY};
use crate::ipc::auth::{require_actor, require_admin};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};
use tracing::info;

#[derive(Clone, Copy)]
enum SetupSection {
    Fees,
    Center,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [SetupSection::Fees, SetupSection::Center];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "fees" => Some(Self::Fees),
            "center" => Some(Self::Center),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Fees => "fees",
            Self::Center => "center",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Fees => FEES_SETTINGS_KEY,
            Self::Center => "setup.center",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Fees => FeeConfig::default_section(),
        SetupSection::Center => json!({
            "name": "",
            "currency": "INR"
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Fees => match k.as_str() {
                "minUnpaidBuffer" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 24)?));
                }
                "horizonMonths" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 120)?));
                }
                "maxPeriods" => {
                    let cap = HARD_CAP_PERIODS as i64;
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, cap)?));
                }
                _ => return Err(format!("unknown fees field: {}", k)),
            },
            SetupSection::Center => match k.as_str() {
                "name" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                "currency" => {
                    let c = parse_string_max(v, k, 3)?.to_ascii_uppercase();
                    if c.len() != 3 || !c.chars().all(|ch| ch.is_ascii_alphabetic()) {
                        return Err("currency must be a 3-letter code".into());
                    }
                    obj.insert(k.clone(), Value::String(c));
                }
                _ => return Err(format!("unknown center field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

/// Center details shown alongside fee views.
pub fn load_center(conn: &rusqlite::Connection) -> anyhow::Result<Value> {
    load_section(conn, SetupSection::Center)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_actor(req) {
        return e.response(&req.id);
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let sections: Vec<SetupSection> = match req.params.get("section").and_then(|v| v.as_str()) {
        Some(raw) => match SetupSection::parse(raw) {
            Some(section) => vec![section],
            None => return err(&req.id, "bad_params", "unknown section", None),
        },
        None => SetupSection::ALL.to_vec(),
    };

    let mut out = Map::new();
    for section in sections {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match require_admin(req) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!(section = section.name(), actor_id = %actor.id, "setup section updated");
    let mut out = Map::new();
    out.insert(section.name().to_string(), current);
    ok(&req.id, Value::Object(out))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
