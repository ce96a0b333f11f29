//! OSM highway classification: way types, their default widths, and the
//! blacklist of types that never enter the geofence index.

/// OSM `highway=*` way types recognized by the shape loader.
///
/// `Other` is the catch-all for unrecognized values and for segments tagged
/// `user_defined`; its 80 m default width is intentional (user-defined
/// corridors are wide by policy, not a sentinel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Highway {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Unclassified,
    Residential,
    Service,
    MotorwayLink,
    TrunkLink,
    PrimaryLink,
    SecondaryLink,
    TertiaryLink,
    LivingStreet,
    Pedestrian,
    Track,
    BusGuideway,
    Raceway,
    Road,
    Footway,
    Bridleway,
    Steps,
    Path,
    Cycleway,
    Proposed,
    Construction,
    BusStop,
    Crossing,
    Elevator,
    EmergencyAccessPoint,
    Escape,
    GiveWay,
    MiniRoundabout,
    MotorwayJunction,
    PassingPlace,
    RestArea,
    SpeedCamera,
    StreetLamp,
    Services,
    Stop,
    TrafficSignals,
    TurningCircle,
    Other,
}

impl Highway {
    /// Map an OSM way-type name to its enum value, case-insensitively.
    /// Unknown names map to `Other`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "motorway" => Highway::Motorway,
            "trunk" => Highway::Trunk,
            "primary" => Highway::Primary,
            "secondary" => Highway::Secondary,
            "tertiary" => Highway::Tertiary,
            "unclassified" => Highway::Unclassified,
            "residential" => Highway::Residential,
            "service" => Highway::Service,
            "motorway_link" => Highway::MotorwayLink,
            "trunk_link" => Highway::TrunkLink,
            "primary_link" => Highway::PrimaryLink,
            "secondary_link" => Highway::SecondaryLink,
            "tertiary_link" => Highway::TertiaryLink,
            "living_street" => Highway::LivingStreet,
            "pedestrian" => Highway::Pedestrian,
            "track" => Highway::Track,
            "bus_guideway" => Highway::BusGuideway,
            "raceway" => Highway::Raceway,
            "road" => Highway::Road,
            "footway" => Highway::Footway,
            "bridleway" => Highway::Bridleway,
            "steps" => Highway::Steps,
            "path" => Highway::Path,
            "cycleway" => Highway::Cycleway,
            "proposed" => Highway::Proposed,
            "construction" => Highway::Construction,
            "bus_stop" => Highway::BusStop,
            "crossing" => Highway::Crossing,
            "elevator" => Highway::Elevator,
            "emergency_access_point" => Highway::EmergencyAccessPoint,
            "escape" => Highway::Escape,
            "give_way" => Highway::GiveWay,
            "mini_roundabout" => Highway::MiniRoundabout,
            "motorway_junction" => Highway::MotorwayJunction,
            "passing_place" => Highway::PassingPlace,
            "rest_area" => Highway::RestArea,
            "speed_camera" => Highway::SpeedCamera,
            "street_lamp" => Highway::StreetLamp,
            "services" => Highway::Services,
            "stop" => Highway::Stop,
            "traffic_signals" => Highway::TrafficSignals,
            "turning_circle" => Highway::TurningCircle,
            _ => Highway::Other,
        }
    }

    /// The canonical OSM name for this way type.
    pub fn name(&self) -> &'static str {
        match self {
            Highway::Motorway => "motorway",
            Highway::Trunk => "trunk",
            Highway::Primary => "primary",
            Highway::Secondary => "secondary",
            Highway::Tertiary => "tertiary",
            Highway::Unclassified => "unclassified",
            Highway::Residential => "residential",
            Highway::Service => "service",
            Highway::MotorwayLink => "motorway_link",
            Highway::TrunkLink => "trunk_link",
            Highway::PrimaryLink => "primary_link",
            Highway::SecondaryLink => "secondary_link",
            Highway::TertiaryLink => "tertiary_link",
            Highway::LivingStreet => "living_street",
            Highway::Pedestrian => "pedestrian",
            Highway::Track => "track",
            Highway::BusGuideway => "bus_guideway",
            Highway::Raceway => "raceway",
            Highway::Road => "road",
            Highway::Footway => "footway",
            Highway::Bridleway => "bridleway",
            Highway::Steps => "steps",
            Highway::Path => "path",
            Highway::Cycleway => "cycleway",
            Highway::Proposed => "proposed",
            Highway::Construction => "construction",
            Highway::BusStop => "bus_stop",
            Highway::Crossing => "crossing",
            Highway::Elevator => "elevator",
            Highway::EmergencyAccessPoint => "emergency_access_point",
            Highway::Escape => "escape",
            Highway::GiveWay => "give_way",
            Highway::MiniRoundabout => "mini_roundabout",
            Highway::MotorwayJunction => "motorway_junction",
            Highway::PassingPlace => "passing_place",
            Highway::RestArea => "rest_area",
            Highway::SpeedCamera => "speed_camera",
            Highway::StreetLamp => "street_lamp",
            Highway::Services => "services",
            Highway::Stop => "stop",
            Highway::TrafficSignals => "traffic_signals",
            Highway::TurningCircle => "turning_circle",
            Highway::Other => "user_defined",
        }
    }

    /// Default corridor width for this way type, in meters. Drives the
    /// edge-to-oriented-rectangle expansion.
    pub fn width(&self) -> f64 {
        match self {
            Highway::Motorway => 22.0,
            Highway::Trunk => 16.0,
            Highway::Primary => 30.0,
            Highway::Secondary => 17.0,
            Highway::Tertiary => 16.0,
            Highway::Unclassified => 22.0,
            Highway::Residential => 17.0,
            Highway::Service => 16.0,
            Highway::MotorwayLink => 16.0,
            Highway::TrunkLink => 16.0,
            Highway::PrimaryLink => 30.0,
            Highway::SecondaryLink => 18.0,
            Highway::TertiaryLink => 16.0,
            Highway::LivingStreet => 16.0,
            Highway::Pedestrian => 10.0,
            Highway::Other => 80.0,
            _ => 16.0,
        }
    }

    /// Way types excluded from geofence insertion at load time.
    pub fn is_blacklisted(&self) -> bool {
        matches!(self, Highway::Pedestrian | Highway::Service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_is_case_insensitive() {
        assert_eq!(Highway::from_name("residential"), Highway::Residential);
        assert_eq!(Highway::from_name("RESIDENTIAL"), Highway::Residential);
        assert_eq!(Highway::from_name("Motorway_Link"), Highway::MotorwayLink);
    }

    #[test]
    fn unknown_names_fall_back_to_other() {
        assert_eq!(Highway::from_name("hyperloop"), Highway::Other);
        assert_eq!(Highway::from_name("user_defined"), Highway::Other);
        assert_eq!(Highway::from_name(""), Highway::Other);
    }

    #[test]
    fn names_round_trip() {
        for hw in [
            Highway::Motorway,
            Highway::Primary,
            Highway::SecondaryLink,
            Highway::TrafficSignals,
            Highway::Other,
        ] {
            assert_eq!(Highway::from_name(hw.name()), hw);
        }
    }

    #[test]
    fn widths_match_policy() {
        assert_eq!(Highway::Motorway.width(), 22.0);
        assert_eq!(Highway::Primary.width(), 30.0);
        assert_eq!(Highway::Pedestrian.width(), 10.0);
        // The catch-all corridor is deliberately wide.
        assert_eq!(Highway::Other.width(), 80.0);
        assert_eq!(Highway::Steps.width(), 16.0);
    }

    #[test]
    fn default_blacklist() {
        assert!(Highway::Pedestrian.is_blacklisted());
        assert!(Highway::Service.is_blacklisted());
        assert!(!Highway::Residential.is_blacklisted());
        assert!(!Highway::Other.is_blacklisted());
    }
}
