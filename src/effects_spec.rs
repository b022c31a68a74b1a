//! The effects-capability table served by the (externally hosted)
//! `/capabilities` route (spec.md §6).
//!
//! Grounded on `scripts/generate_effects.py`'s `generate_capabilities`: the
//! original loads a declarative `effects_spec.yaml` at build/startup time and
//! derives a `supported_effects` list plus a per-effect parameter-range table
//! from it. This crate carries the same declarative-source idea but embeds
//! the spec as JSON (`effects_spec.json`, checked in next to this module)
//! rather than YAML, since no YAML crate appears anywhere in this corpus's
//! dependency set and `serde_json` is already a direct dependency. Parsed
//! once via `OnceLock` — no `once_cell`/`lazy_static` needed for a
//! single embedded resource.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const EFFECTS_SPEC_JSON: &str = include_str!("effects_spec.json");

/// One parameter's allowed range/shape, flattened from the source spec's
/// `type`/`minimum`/`maximum`/`enum`/`default`/`pattern` fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamRange {
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "enum")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Either a single-value effect (one `ParamRange`) or a multi-param one
/// (named params, `enabled` itself dropped from the listing — mirroring the
/// original's `if pname == "enabled": continue`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EffectParams {
    Single(ParamRange),
    Multi(BTreeMap<String, ParamRange>),
}

/// The full table queried by `/capabilities` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectsCapabilities {
    pub supported_effects: Vec<String>,
    pub effect_params: BTreeMap<String, EffectParams>,
}

fn param_range_from(def: &Value) -> ParamRange {
    ParamRange {
        param_type: def.get("type").and_then(Value::as_str).unwrap_or("string").to_string(),
        min: def.get("minimum").and_then(Value::as_f64),
        max: def.get("maximum").and_then(Value::as_f64),
        pattern: def.get("pattern").and_then(Value::as_str).map(str::to_string),
        allowed_values: def.get("enum").and_then(Value::as_array).map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        }),
        default: def.get("default").cloned(),
    }
}

fn parse(spec_json: &str) -> EffectsCapabilities {
    let root: Value = serde_json::from_str(spec_json).expect("embedded effects_spec.json must parse");
    let effects = root.get("effects").and_then(Value::as_object);

    let mut supported_effects = Vec::new();
    let mut effect_params = BTreeMap::new();

    if let Some(effects) = effects {
        for (name, edef) in effects {
            supported_effects.push(name.clone());
            let Some(params) = edef.get("params").and_then(Value::as_object) else {
                continue;
            };
            if params.len() == 1 && params.contains_key("value") {
                effect_params.insert(name.clone(), EffectParams::Single(param_range_from(&params["value"])));
            } else {
                let mut multi = BTreeMap::new();
                for (pname, pdef) in params {
                    if pname == "enabled" {
                        continue;
                    }
                    multi.insert(pname.clone(), param_range_from(pdef));
                }
                effect_params.insert(name.clone(), EffectParams::Multi(multi));
            }
        }
    }

    EffectsCapabilities {
        supported_effects,
        effect_params,
    }
}

static CAPABILITIES: OnceLock<EffectsCapabilities> = OnceLock::new();

/// The stable, process-wide `/capabilities` table, parsed from the embedded
/// spec on first access and cached for the life of the process.
pub fn capabilities() -> &'static EffectsCapabilities {
    CAPABILITIES.get_or_init(|| parse(EFFECTS_SPEC_JSON))
}

/// Is `field` a recognized effect field? Unknown fields on an input request
/// are silently dropped rather than rejected (spec.md §6): callers use this
/// to decide what to keep, not to produce a validation error.
pub fn is_known_effect(name: &str) -> bool {
    capabilities().supported_effects.iter().any(|e| e == name)
}
