//! Equipment catalogue and point templates

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipmentType {
    Ahu,
    Vav,
    Fcu,
    Chiller,
    Boiler,
    Pump,
    Fan,
    Lighting,
    ElecMeter,
}

/// Role of a point in the BMS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointClass {
    Sensor,
    Setpoint,
    Command,
    Status,
    Alarm,
}

impl PointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointClass::Sensor => "sensor",
            PointClass::Setpoint => "setpoint",
            PointClass::Command => "command",
            PointClass::Status => "status",
            PointClass::Alarm => "alarm",
        }
    }

    /// Points written by the BMS, which may control other equipment
    pub fn is_command_class(&self) -> bool {
        matches!(self, PointClass::Command | PointClass::Setpoint)
    }
}

/// Maximum points per equipment; also the template length
pub const MAX_POINTS_PER_EQUIPMENT: usize = 10;

type Template = [(&'static str, PointClass); MAX_POINTS_PER_EQUIPMENT];

use PointClass::*;

const AHU_POINTS: Template = [
    ("Supply Air Temp", Sensor),
    ("Return Air Temp", Sensor),
    ("Supply Air Temp Setpoint", Setpoint),
    ("Supply Fan Speed Command", Command),
    ("Supply Air Flow", Sensor),
    ("Filter Differential Pressure", Sensor),
    ("Return Air Humidity", Sensor),
    ("Outside Air Damper Position", Command),
    ("Fan Run Status", Status),
    ("Filter Alarm", Alarm),
];

const VAV_POINTS: Template = [
    ("Zone Air Temp", Sensor),
    ("Zone Temp Setpoint", Setpoint),
    ("Damper Position", Command),
    ("Discharge Air Flow", Sensor),
    ("Zone CO2", Sensor),
    ("Occupancy Status", Status),
    ("Reheat Valve Position", Command),
    ("Discharge Air Temp", Sensor),
    ("Zone Humidity", Sensor),
    ("Fault Alarm", Alarm),
];

const FCU_POINTS: Template = [
    ("Room Temp", Sensor),
    ("Room Temp Setpoint", Setpoint),
    ("Fan Speed Command", Command),
    ("Chilled Water Valve Position", Command),
    ("Fan Run Status", Status),
    ("Fault Alarm", Alarm),
    ("Discharge Air Temp", Sensor),
    ("Room Humidity", Sensor),
    ("Fan Power", Sensor),
    ("Filter Alarm", Alarm),
];

const CHILLER_POINTS: Template = [
    ("Chilled Water Supply Temp", Sensor),
    ("Chilled Water Return Temp", Sensor),
    ("Chilled Water Temp Setpoint", Setpoint),
    ("Chiller Power", Sensor),
    ("Chilled Water Flow", Sensor),
    ("Condenser Pressure", Sensor),
    ("Chiller Run Command", Command),
    ("Chiller Fault Alarm", Alarm),
    ("Chiller Energy", Sensor),
    ("Condenser Fan Speed", Sensor),
];

const BOILER_POINTS: Template = [
    ("Hot Water Supply Temp", Sensor),
    ("Hot Water Return Temp", Sensor),
    ("Hot Water Temp Setpoint", Setpoint),
    ("Burner Firing Position", Command),
    ("Gas Flow", Sensor),
    ("Boiler Run Command", Command),
    ("Boiler Fault Alarm", Alarm),
    ("Flue Gas Temp", Sensor),
    ("Boiler Power", Sensor),
    ("Boiler Energy", Sensor),
];

const PUMP_POINTS: Template = [
    ("Pump Speed Command", Command),
    ("Pump Run Status", Status),
    ("Differential Pressure", Sensor),
    ("Water Flow", Sensor),
    ("Pump Power", Sensor),
    ("Pump Fault Alarm", Alarm),
    ("Motor Temp", Sensor),
    ("Differential Pressure Setpoint", Setpoint),
    ("Pump Energy", Sensor),
    ("Pump Enable Command", Command),
];

const FAN_POINTS: Template = [
    ("Fan Speed Command", Command),
    ("Fan Run Status", Status),
    ("Air Flow", Sensor),
    ("Static Pressure", Sensor),
    ("Fan Power", Sensor),
    ("Fan Fault Alarm", Alarm),
    ("Motor Temp", Sensor),
    ("Static Pressure Setpoint", Setpoint),
    ("Fan Energy", Sensor),
    ("Inlet Vane Position", Command),
];

const LIGHTING_POINTS: Template = [
    ("Lighting Level Command", Command),
    ("Lighting Status", Status),
    ("Occupancy Status", Status),
    ("Lighting Power", Sensor),
    ("Lighting Energy", Sensor),
    ("Lamp Fault Alarm", Alarm),
    ("Dimming Position", Command),
    ("Daylight Level", Sensor),
    ("Emergency Test Status", Status),
    ("Driver Temp", Sensor),
];

const ELEC_METER_POINTS: Template = [
    ("Active Energy", Sensor),
    ("Active Power", Sensor),
    ("Reactive Energy", Sensor),
    ("Power Demand", Sensor),
    ("Phase A Power", Sensor),
    ("Phase B Power", Sensor),
    ("Phase C Power", Sensor),
    ("Meter Comms Alarm", Alarm),
    ("Peak Demand", Sensor),
    ("Export Energy", Sensor),
];

impl EquipmentType {
    pub const ALL: [EquipmentType; 9] = [
        EquipmentType::Ahu,
        EquipmentType::Vav,
        EquipmentType::Fcu,
        EquipmentType::Chiller,
        EquipmentType::Boiler,
        EquipmentType::Pump,
        EquipmentType::Fan,
        EquipmentType::Lighting,
        EquipmentType::ElecMeter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentType::Ahu => "AHU",
            EquipmentType::Vav => "VAV",
            EquipmentType::Fcu => "FCU",
            EquipmentType::Chiller => "Chiller",
            EquipmentType::Boiler => "Boiler",
            EquipmentType::Pump => "Pump",
            EquipmentType::Fan => "Fan",
            EquipmentType::Lighting => "Lighting",
            EquipmentType::ElecMeter => "ElecMeter",
        }
    }

    pub fn domain(&self) -> &'static str {
        match self {
            EquipmentType::Ahu | EquipmentType::Vav | EquipmentType::Fcu | EquipmentType::Fan => "HVAC",
            EquipmentType::Chiller | EquipmentType::Boiler | EquipmentType::Pump => "Plant",
            EquipmentType::Lighting => "Lighting",
            EquipmentType::ElecMeter => "Electrical",
        }
    }

    /// Relative frequency in a typical commercial building
    pub fn weight(&self) -> f64 {
        match self {
            EquipmentType::Ahu => 1.0,
            EquipmentType::Vav => 4.0,
            EquipmentType::Fcu => 3.0,
            EquipmentType::Chiller => 0.5,
            EquipmentType::Boiler => 0.5,
            EquipmentType::Pump => 1.0,
            EquipmentType::Fan => 1.0,
            EquipmentType::Lighting => 3.0,
            EquipmentType::ElecMeter => 1.0,
        }
    }

    /// Points in the order they are attached; an equipment with `k` points
    /// gets the first `k`.
    pub fn point_template(&self) -> &'static Template {
        match self {
            EquipmentType::Ahu => &AHU_POINTS,
            EquipmentType::Vav => &VAV_POINTS,
            EquipmentType::Fcu => &FCU_POINTS,
            EquipmentType::Chiller => &CHILLER_POINTS,
            EquipmentType::Boiler => &BOILER_POINTS,
            EquipmentType::Pump => &PUMP_POINTS,
            EquipmentType::Fan => &FAN_POINTS,
            EquipmentType::Lighting => &LIGHTING_POINTS,
            EquipmentType::ElecMeter => &ELEC_METER_POINTS,
        }
    }
}

impl fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosbench_timeseries::PointType;

    #[test]
    fn test_templates_classify_as_named() {
        let classify = |e: EquipmentType, i: usize| PointType::classify(e.point_template()[i].0, Some(e.as_str()));
        assert_eq!(classify(EquipmentType::Ahu, 0), PointType::Temperature);
        assert_eq!(classify(EquipmentType::Ahu, 3), PointType::Speed);
        assert_eq!(classify(EquipmentType::Ahu, 5), PointType::Pressure);
        assert_eq!(classify(EquipmentType::Ahu, 7), PointType::Position);
        assert_eq!(classify(EquipmentType::Vav, 4), PointType::Co2);
        assert_eq!(classify(EquipmentType::Chiller, 9), PointType::Speed);
        assert_eq!(classify(EquipmentType::Lighting, 0), PointType::Position);
        assert_eq!(classify(EquipmentType::ElecMeter, 0), PointType::Energy);
        assert_eq!(classify(EquipmentType::ElecMeter, 8), PointType::Power);
    }

    #[test]
    fn test_alarm_class_matches_alarm_type() {
        for e in EquipmentType::ALL {
            for (name, class) in e.point_template() {
                let t = PointType::classify(name, Some(e.as_str()));
                assert_eq!(*class == PointClass::Alarm, t == PointType::Alarm, "{e} {name}");
            }
        }
    }
}
