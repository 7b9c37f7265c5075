//! Compiled-in device classes.

use super::codec::{Codec, PERCENT};
use super::{DeviceClass, Property};
use crate::key::ClassCode;
use crate::state::Unit;

pub const GET_PROPERTY_MAP: u8 = 0x9F;
pub const SET_PROPERTY_MAP: u8 = 0x9E;
pub const ANNOUNCE_PROPERTY_MAP: u8 = 0x9D;
pub const OPERATION_STATUS: u8 = 0x80;
pub const IDENTIFICATION_NUMBER: u8 = 0x83;
pub const INSTANCE_LIST_NOTIFICATION: u8 = 0xD5;
pub const SELF_NODE_INSTANCE_LIST: u8 = 0xD6;

pub const GROUP_AIR_CONDITIONER: u8 = 0x01;
pub const GROUP_PROFILE: u8 = 0x0E;

const OPERATION_ON_OFF: Codec = Codec::OnOff { on: 0x30, off: 0x31 };
const BINARY_41_42: Codec = Codec::OnOff { on: 0x41, off: 0x42 };

const AIR_FLOW_LEVELS: &[(u8, &str)] = &[
    (0x41, "auto"),
    (0x31, "level-1"),
    (0x32, "level-2"),
    (0x33, "level-3"),
    (0x34, "level-4"),
    (0x35, "level-5"),
    (0x36, "level-6"),
    (0x37, "level-7"),
    (0x38, "level-8"),
];

const AC_OPERATION_MODES: &[(u8, &str)] = &[
    (0x40, "other"),
    (0x41, "auto"),
    (0x42, "cooling"),
    (0x43, "heating"),
    (0x44, "dehumidification"),
    (0x45, "air-circulation"),
];

const AC_SPEED_MODES: &[(u8, &str)] = &[(0x41, "normal"), (0x42, "high-speed"), (0x43, "silent")];

const SWING_MODES: &[(u8, &str)] = &[
    (0x31, "off"),
    (0x41, "vertical"),
    (0x42, "horizontal"),
    (0x43, "both"),
];

const REMOTE_CONTROL: &[(u8, &str)] = &[
    (0x41, "no-public-line"),
    (0x42, "public-line"),
    (0x61, "no-public-line-normal"),
    (0x62, "public-line-normal"),
];

/// Super-class properties shared by every appliance object.
static DEVICE_PROPERTIES: [Property; 27] = [
    Property::read_write(OPERATION_STATUS, "operation-status", OPERATION_ON_OFF),
    Property::read_write(0x81, "installation-location", Codec::InstallationLocation),
    Property::read_only(0x82, "standard-version", Codec::Hex),
    Property::read_only(IDENTIFICATION_NUMBER, "identification-number", Codec::Hex),
    Property::read_only(
        0x84,
        "instantaneous-power",
        Codec::Unsigned { width: 2, unit: Some(Unit::Watt), scale: 1.0 },
    ),
    Property::read_only(
        0x85,
        "cumulative-power",
        Codec::Unsigned { width: 4, unit: Some(Unit::KilowattHour), scale: 0.001 },
    ),
    Property::read_only(0x86, "manufacturer-fault-code", Codec::Hex),
    Property::read_write(0x87, "current-limit", PERCENT),
    Property::read_only(0x88, "fault-status", BINARY_41_42),
    Property::read_only(0x89, "fault-description", Codec::Hex),
    Property::read_only(0x8A, "manufacturer-code", Codec::Hex),
    Property::read_only(0x8B, "business-facility-code", Codec::Hex),
    Property::read_only(0x8C, "product-code", Codec::Ascii),
    Property::read_only(0x8D, "production-number", Codec::Ascii),
    Property::read_only(0x8E, "production-date", Codec::Date),
    Property::read_write(0x8F, "power-saving", BINARY_41_42),
    Property::read_write(0x93, "remote-control", Codec::Options(REMOTE_CONTROL)),
    Property::read_write(0x97, "current-time", Codec::TimeOfDay),
    Property::read_write(0x98, "current-date", Codec::Date),
    Property::read_write(
        0x99,
        "power-limit",
        Codec::Unsigned { width: 2, unit: Some(Unit::Watt), scale: 1.0 },
    ),
    Property::read_only(0x9A, "cumulative-operating-time", Codec::OperatingTime),
    Property::marker(0x9B, "setm-property-map"),
    Property::marker(0x9C, "getm-property-map"),
    Property::marker(ANNOUNCE_PROPERTY_MAP, "announce-property-map"),
    Property::marker(SET_PROPERTY_MAP, "set-property-map"),
    Property::marker(GET_PROPERTY_MAP, "get-property-map"),
    Property::write_only(0x96, "power-limit-reset", BINARY_41_42),
];

static PROFILE_PROPERTIES: [Property; 15] = [
    Property::read_only(OPERATION_STATUS, "operating-status", OPERATION_ON_OFF),
    Property::read_only(0x82, "version", Codec::Hex),
    Property::read_only(IDENTIFICATION_NUMBER, "identification-number", Codec::Hex),
    Property::read_only(0x89, "fault-content", Codec::Hex),
    Property::read_only(0x8A, "manufacturer-code", Codec::Hex),
    Property::marker(ANNOUNCE_PROPERTY_MAP, "announce-property-map"),
    Property::marker(SET_PROPERTY_MAP, "set-property-map"),
    Property::marker(GET_PROPERTY_MAP, "get-property-map"),
    Property::read_write(0xBF, "unique-identifier", Codec::Hex),
    Property::read_only(
        0xD3,
        "instance-count",
        Codec::Unsigned { width: 3, unit: None, scale: 1.0 },
    ),
    Property::read_only(
        0xD4,
        "class-count",
        Codec::Unsigned { width: 2, unit: None, scale: 1.0 },
    ),
    Property::marker(INSTANCE_LIST_NOTIFICATION, "instance-list-notification"),
    Property::marker(SELF_NODE_INSTANCE_LIST, "self-node-instance-list"),
    Property::marker(0xD7, "self-node-class-list"),
    Property::read_only(0x8C, "product-code", Codec::Ascii),
];

static NO_PROPERTIES: [Property; 0] = [];

static HOME_AC_PROPERTIES: [Property; 11] = [
    Property::read_write(0xB0, "operation-mode", Codec::Options(AC_OPERATION_MODES)),
    Property::read_write(0xB1, "automatic-temperature-control", BINARY_41_42),
    Property::read_write(0xB2, "speed-mode", Codec::Options(AC_SPEED_MODES)),
    Property::read_write(0xB3, "set-temperature", Codec::SetTemperature),
    Property::read_write(0xB4, "set-humidity-dehumidify", PERCENT),
    Property::read_only(0xBA, "room-humidity", PERCENT),
    Property::read_only(0xBB, "room-temperature", Codec::Temperature),
    Property::read_only(0xBE, "outdoor-temperature", Codec::Temperature),
    Property::read_write(0xA0, "air-flow-rate", Codec::Options(AIR_FLOW_LEVELS)),
    Property::read_write(0xA3, "swing-mode", Codec::Options(SWING_MODES)),
    Property::read_write(0xC7, "air-purifier", BINARY_41_42),
];

static VENTILATION_FAN_PROPERTIES: [Property; 2] = [
    Property::read_write(0xA0, "air-flow-rate", Codec::Options(AIR_FLOW_LEVELS)),
    Property::read_write(0xBF, "automatic-ventilation", BINARY_41_42),
];

static AIR_CLEANER_PROPERTIES: [Property; 2] = [
    Property::read_write(0xA0, "air-flow-rate", Codec::Options(AIR_FLOW_LEVELS)),
    Property::read_only(0xE1, "filter-change-notice", BINARY_41_42),
];

static HUMIDIFIER_PROPERTIES: [Property; 3] = [
    Property::read_write(0xC0, "humidity-setting", PERCENT),
    Property::read_write(0xC1, "humidifier-level", Codec::Options(AIR_FLOW_LEVELS)),
    Property::read_only(0xBA, "room-humidity", PERCENT),
];

pub static NODE_PROFILE: DeviceClass = DeviceClass {
    name: "node-profile",
    code: ClassCode::new(GROUP_PROFILE, 0xF0),
    device_properties: &PROFILE_PROPERTIES,
    group_properties: &NO_PROPERTIES,
    class_properties: &NO_PROPERTIES,
};

pub static HOME_AIR_CONDITIONER: DeviceClass = DeviceClass {
    name: "home-air-conditioner",
    code: ClassCode::new(GROUP_AIR_CONDITIONER, 0x30),
    device_properties: &DEVICE_PROPERTIES,
    group_properties: &NO_PROPERTIES,
    class_properties: &HOME_AC_PROPERTIES,
};

pub static VENTILATION_FAN: DeviceClass = DeviceClass {
    name: "ventilation-fan",
    code: ClassCode::new(GROUP_AIR_CONDITIONER, 0x33),
    device_properties: &DEVICE_PROPERTIES,
    group_properties: &NO_PROPERTIES,
    class_properties: &VENTILATION_FAN_PROPERTIES,
};

pub static AIR_CLEANER: DeviceClass = DeviceClass {
    name: "air-cleaner",
    code: ClassCode::new(GROUP_AIR_CONDITIONER, 0x35),
    device_properties: &DEVICE_PROPERTIES,
    group_properties: &NO_PROPERTIES,
    class_properties: &AIR_CLEANER_PROPERTIES,
};

pub static HUMIDIFIER: DeviceClass = DeviceClass {
    name: "humidifier",
    code: ClassCode::new(GROUP_AIR_CONDITIONER, 0x39),
    device_properties: &DEVICE_PROPERTIES,
    group_properties: &NO_PROPERTIES,
    class_properties: &HUMIDIFIER_PROPERTIES,
};

pub static ALL_CLASSES: [&DeviceClass; 5] = [
    &NODE_PROFILE,
    &HOME_AIR_CONDITIONER,
    &VENTILATION_FAN,
    &AIR_CLEANER,
    &HUMIDIFIER,
];
