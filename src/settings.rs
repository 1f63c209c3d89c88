// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-facing settings: stable string keys, domain validation and the
//! conversions between display values and the raw codes found in
//! status buffers.
//!
//! Temperatures travel as tenths of Kelvin with the 273.0 offset the
//! reference device uses; `0x0000`, `0x0AAA` and `0xAAAA` are "off"
//! sentinels. All arithmetic is done in tenths of a degree to keep the
//! codes exact.

use smallvec::SmallVec;

use crate::error::SettingError;

/// Wire codes of the heating mode enum.
pub const HEATING_MODE_OFF: u32 = 0;
pub const HEATING_MODE_ECO: u32 = 1;
pub const HEATING_MODE_HIGH: u32 = 10;

/// Wire codes of the energy mix bit set: bit 0 gas, bit 1 electricity.
pub const ENERGY_MIX_NONE: u32 = 0b00;
pub const ENERGY_MIX_GAS: u32 = 0b01;
pub const ENERGY_MIX_ELECTRICITY: u32 = 0b10;
pub const ENERGY_MIX_MIX: u32 = 0b11;

/// Which write-buffer family a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
    /// Heating control, uploaded as the `(0x0C, 0x32)` buffer.
    Control,
    /// Wall clock, uploaded as the `(0x15, 0x24)` buffer.
    Clock,
}

/// A raw field write produced from one user set-request.
pub type FieldWrite = (&'static str, u32);

/// Route a writable field name to its buffer family.
#[must_use]
pub fn family_of(field: &str) -> Family {
    if field.starts_with("wall_time_") {
        Family::Clock
    } else {
        Family::Control
    }
}

/// Encode a temperature in tenths of a degree Celsius as the two-byte
/// wire code. Values below 5 °C mean "off" and encode as zero.
#[must_use]
pub fn temp_code(tenths: i32) -> u32 {
    if tenths < 50 {
        0
    } else {
        (tenths + 2730) as u32
    }
}

/// Decode a two-byte temperature code to a display string in °C.
#[must_use]
pub fn temp_string(code: u32) -> String {
    if code == 0x0000 || code == 0x0AAA || code == 0xAAAA {
        return "0".to_string();
    }
    let tenths = code as i64 - 2730;
    format!("{}.{}", tenths / 10, (tenths % 10).abs())
}

/// Decode a heating-mode code to its display name.
#[must_use]
pub fn heating_mode_string(code: u32) -> String {
    match code {
        HEATING_MODE_OFF => "off".to_string(),
        HEATING_MODE_ECO => "eco".to_string(),
        HEATING_MODE_HIGH => "high".to_string(),
        _ => format!("unknown ({code})"),
    }
}

/// Decode an energy-mix code to its display name.
#[must_use]
pub fn energy_mix_string(code: u32) -> String {
    match code {
        ENERGY_MIX_NONE => "none".to_string(),
        ENERGY_MIX_GAS => "gas".to_string(),
        ENERGY_MIX_ELECTRICITY => "electricity".to_string(),
        ENERGY_MIX_MIX => "mix".to_string(),
        _ => format!("unknown ({code})"),
    }
}

/// Decode the operating-status byte of the read buffer.
#[must_use]
pub fn operating_status_string(code: u32) -> String {
    match code {
        0 => "off".to_string(),
        1 => "warning".to_string(),
        4 => "on (starting)".to_string(),
        5 => "on".to_string(),
        _ => format!("unknown ({code})"),
    }
}

/// Decode the two error-code bytes: high byte * 100 + low byte.
#[must_use]
pub fn error_code_string(code: u32) -> String {
    ((code >> 8) * 100 + (code & 0xFF)).to_string()
}

fn domain_err(key: &str, value: &str) -> SettingError {
    SettingError::Domain {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_err(key: &str, value: &str) -> SettingError {
    SettingError::Parse {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, SettingError> {
    value.trim().parse::<u32>().map_err(|_| parse_err(key, value))
}

/// Validate one set-request and convert it to raw field writes.
///
/// Most keys map to exactly one field; the synthetic `mode` key
/// expands to several. `default_heating_mode` backs the `mode=heat`
/// shorthand.
pub fn parse_request(
    key: &str,
    value: &str,
    default_heating_mode: u32,
) -> Result<SmallVec<[FieldWrite; 2]>, SettingError> {
    let value = value.trim();
    let mut writes = SmallVec::new();
    match key {
        "target_temp_room" => {
            // Whole degrees only; the bus carries finer codes, but the
            // room setpoint is an integer by contract.
            let celsius = value.parse::<i32>().map_err(|_| parse_err(key, value))?;
            if celsius != 0 && !(5..=30).contains(&celsius) {
                return Err(domain_err(key, value));
            }
            writes.push(("target_temp_room", temp_code(celsius * 10)));
        }
        "target_temp_water" => {
            let celsius = parse_u32(key, value)?;
            if !matches!(celsius, 0 | 40 | 60 | 200) {
                return Err(domain_err(key, value));
            }
            writes.push(("target_temp_water", temp_code(celsius as i32 * 10)));
        }
        "heating_mode" => {
            let code = match value {
                "off" => HEATING_MODE_OFF,
                "eco" => HEATING_MODE_ECO,
                "high" | "boost" => HEATING_MODE_HIGH,
                _ => return Err(domain_err(key, value)),
            };
            writes.push(("heating_mode", code));
        }
        "energy_mix" => {
            let code = match value {
                "none" => ENERGY_MIX_NONE,
                "gas" => ENERGY_MIX_GAS,
                "electricity" => ENERGY_MIX_ELECTRICITY,
                "mix" => ENERGY_MIX_MIX,
                _ => return Err(domain_err(key, value)),
            };
            writes.push(("energy_mix", code));
        }
        "el_power_level" => {
            let watts = parse_u32(key, value)?;
            if !matches!(watts, 0 | 900 | 1800) {
                return Err(domain_err(key, value));
            }
            writes.push(("el_power_level", watts));
        }
        "wall_time_hours" => {
            let hours = parse_u32(key, value)?;
            if hours > 23 {
                return Err(domain_err(key, value));
            }
            writes.push(("wall_time_hours", hours));
        }
        "wall_time_minutes" => {
            let minutes = parse_u32(key, value)?;
            if minutes > 59 {
                return Err(domain_err(key, value));
            }
            writes.push(("wall_time_minutes", minutes));
        }
        "wall_time_seconds" => {
            let seconds = parse_u32(key, value)?;
            if seconds > 59 {
                return Err(domain_err(key, value));
            }
            writes.push(("wall_time_seconds", seconds));
        }
        "mode" => match value {
            "off" => {
                writes.push(("heating_mode", HEATING_MODE_OFF));
                writes.push(("target_temp_room", 0));
            }
            "heat" => {
                writes.push(("heating_mode", default_heating_mode));
            }
            _ => return Err(domain_err(key, value)),
        },
        _ => return Err(SettingError::UnknownKey(key.to_string())),
    }
    Ok(writes)
}

/// Cross-validate a buffered control update before it is committed.
///
/// When only one side of an interdependent pair is supplied, the
/// configured default fills the gap; a contradictory pair is resolved
/// toward the default and reported.
pub fn cross_validate(
    pending: &mut std::collections::BTreeMap<&'static str, u32>,
    default_heating_mode: u32,
    default_el_power: u32,
) -> Vec<SettingError> {
    let mut errors = Vec::new();

    let energy_mix = pending.get("energy_mix").copied();
    let el_power = pending.get("el_power_level").copied();
    if let Some(mix) = energy_mix {
        if mix != ENERGY_MIX_NONE {
            match el_power {
                None => {
                    pending.insert("el_power_level", default_el_power);
                }
                Some(0) => {
                    errors.push(SettingError::Conflict {
                        key: "el_power_level".to_string(),
                        reason: format!(
                            "energy mix `{}` requires an electric power level",
                            energy_mix_string(mix)
                        ),
                    });
                    pending.insert("el_power_level", default_el_power);
                }
                Some(_) => {}
            }
        }
    }

    let room = pending.get("target_temp_room").copied();
    let heating = pending.get("heating_mode").copied();
    if let Some(code) = room {
        if code != 0 {
            match heating {
                None => {
                    pending.insert("heating_mode", default_heating_mode);
                }
                Some(HEATING_MODE_OFF) => {
                    errors.push(SettingError::Conflict {
                        key: "heating_mode".to_string(),
                        reason: "a room temperature target requires a heating mode".to_string(),
                    });
                    pending.insert("heating_mode", default_heating_mode);
                }
                Some(_) => {}
            }
        }
    }

    errors
}
