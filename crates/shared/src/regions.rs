//! Region-aware signup defaults
//!
//! A new business gets a starting configuration derived from the US state it
//! signed up with: a timezone, a climate profile, and the vehicle-condition
//! checklist presets a detailer in that region most commonly needs. These are
//! applied only on first tenant creation; later billing events never rewrite
//! them.

use serde::{Deserialize, Serialize};

/// Broad climate profile used to seed condition checklists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Climate {
    /// Hot and dry (AZ, NV, inland CA)
    Arid,
    /// Hot and humid, coastal salt exposure (FL, gulf coast)
    HumidCoastal,
    /// Snow and road salt in winter (northeast, upper midwest)
    SnowBelt,
    /// Mild pacific coast
    Marine,
    /// Everything else
    Temperate,
}

/// Starting configuration for a newly created business
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionDefaults {
    pub timezone: &'static str,
    pub climate: Climate,
    /// Condition checklist presets seeded into the business's job templates
    pub starting_conditions: &'static [&'static str],
}

const ARID_CONDITIONS: &[&str] = &["sun_faded_paint", "dust_buildup", "cracked_trim"];
const HUMID_COASTAL_CONDITIONS: &[&str] = &["salt_exposure", "mold_mildew", "love_bugs"];
const SNOW_BELT_CONDITIONS: &[&str] = &["road_salt", "winter_grime", "undercarriage_rust"];
const MARINE_CONDITIONS: &[&str] = &["hard_water_spots", "tree_sap", "overspray"];
const TEMPERATE_CONDITIONS: &[&str] = &["general_soiling", "tree_sap"];

/// Resolve starting defaults for a two-letter US state code
///
/// Unknown or non-US codes fall back to a neutral temperate profile rather
/// than failing signup.
pub fn region_defaults(state: &str) -> RegionDefaults {
    match state.to_ascii_uppercase().as_str() {
        "AZ" | "NV" | "NM" | "UT" => RegionDefaults {
            timezone: "America/Phoenix",
            climate: Climate::Arid,
            starting_conditions: ARID_CONDITIONS,
        },
        "FL" | "LA" | "MS" | "AL" | "SC" | "GA" => RegionDefaults {
            timezone: "America/New_York",
            climate: Climate::HumidCoastal,
            starting_conditions: HUMID_COASTAL_CONDITIONS,
        },
        "TX" | "OK" => RegionDefaults {
            timezone: "America/Chicago",
            climate: Climate::Arid,
            starting_conditions: ARID_CONDITIONS,
        },
        "NY" | "NJ" | "CT" | "MA" | "RI" | "VT" | "NH" | "ME" | "PA" | "OH" | "MI" | "WI"
        | "MN" | "IL" | "IN" | "IA" => RegionDefaults {
            timezone: "America/New_York",
            climate: Climate::SnowBelt,
            starting_conditions: SNOW_BELT_CONDITIONS,
        },
        "CA" => RegionDefaults {
            timezone: "America/Los_Angeles",
            climate: Climate::Marine,
            starting_conditions: MARINE_CONDITIONS,
        },
        "WA" | "OR" => RegionDefaults {
            timezone: "America/Los_Angeles",
            climate: Climate::Marine,
            starting_conditions: MARINE_CONDITIONS,
        },
        _ => RegionDefaults {
            timezone: "America/Chicago",
            climate: Climate::Temperate,
            starting_conditions: TEMPERATE_CONDITIONS,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_california_gets_marine_profile() {
        let defaults = region_defaults("CA");
        assert_eq!(defaults.climate, Climate::Marine);
        assert_eq!(defaults.timezone, "America/Los_Angeles");
        assert!(defaults.starting_conditions.contains(&"hard_water_spots"));
    }

    #[test]
    fn test_state_code_is_case_insensitive() {
        assert_eq!(region_defaults("fl"), region_defaults("FL"));
        assert_eq!(region_defaults("fl").climate, Climate::HumidCoastal);
    }

    #[test]
    fn test_snow_belt_seeds_road_salt() {
        let defaults = region_defaults("NY");
        assert_eq!(defaults.climate, Climate::SnowBelt);
        assert!(defaults.starting_conditions.contains(&"road_salt"));
    }

    #[test]
    fn test_unknown_state_falls_back_to_temperate() {
        let defaults = region_defaults("ZZ");
        assert_eq!(defaults.climate, Climate::Temperate);
        // Fallback must never produce an empty checklist
        assert!(!defaults.starting_conditions.is_empty());
    }
}
