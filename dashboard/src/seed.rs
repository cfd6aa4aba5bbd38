//! Demo data loaded at startup when `--seed-demo` is set.

use crate::model::{
    ConnectionType, Device, DeviceStatus, Floor, FloorBin, User, UserRole, UserStatus, WasteType,
};

#[allow(clippy::too_many_arguments)]
fn bin(
    id: &str,
    model: &str,
    firmware: &str,
    location: &str,
    building: &str,
    floor: &str,
    zone: &str,
    connection_type: ConnectionType,
    network: &str,
    waste_type: WasteType,
    (warning_level, critical_level): (i32, i32),
    (fill_level, battery_level): (i32, i32),
    last_emptied: &str,
    coords: (f64, f64),
) -> Device {
    Device {
        id: id.to_string(),
        model: model.to_string(),
        firmware_version: firmware.to_string(),
        location_name: location.to_string(),
        building: building.to_string(),
        floor: floor.to_string(),
        zone: zone.to_string(),
        connection_type,
        network_name: network.to_string(),
        waste_type,
        warning_level,
        critical_level,
        fill_level,
        battery_level,
        status: DeviceStatus::derive(fill_level, warning_level, critical_level),
        last_emptied: last_emptied.to_string(),
        coords: Some(coords),
    }
}

pub fn demo_devices() -> Vec<Device> {
    vec![
        bin(
            "SB-101",
            "EcoBin-100",
            "v1.2.3",
            "Cafeteria",
            "Building A",
            "1",
            "A",
            ConnectionType::Wifi,
            "Office_WiFi",
            WasteType::Wet,
            (70, 85),
            (42, 95),
            "4 hours ago",
            (51.51, -0.1),
        ),
        bin(
            "SB-102",
            "SmartBin-200",
            "v2.0.1",
            "Main Entrance",
            "Building A",
            "G",
            "Lobby",
            ConnectionType::Cellular,
            "IoT_Network",
            WasteType::Dry,
            (75, 90),
            (78, 45),
            "1 day ago",
            (51.505, -0.09),
        ),
        bin(
            "SB-103",
            "IoT-Waste-300",
            "v3.1.0",
            "Floor 2, West Wing",
            "Building B",
            "2",
            "C",
            ConnectionType::Ethernet,
            "CorpNet",
            WasteType::Dry,
            (80, 95),
            (95, 15),
            "2 days ago",
            (51.515, -0.12),
        ),
        bin(
            "SB-104",
            "EcoBin-100",
            "v1.2.5",
            "Parking P1",
            "Building A",
            "P1",
            "A",
            ConnectionType::Wifi,
            "Office_WiFi",
            WasteType::Dry,
            (70, 85),
            (35, 88),
            "8 hours ago",
            (51.52, -0.11),
        ),
    ]
}

fn user(
    id: &str,
    first_name: &str,
    role: UserRole,
    email: &str,
    last_login: &str,
    status: UserStatus,
) -> User {
    User {
        id: id.to_string(),
        first_name: first_name.to_string(),
        last_name: "User".to_string(),
        email: email.to_string(),
        role,
        last_login: last_login.to_string(),
        status,
    }
}

pub fn demo_users() -> Vec<User> {
    vec![
        user(
            "user-1",
            "Admin",
            UserRole::Administrator,
            "admin@example.com",
            "2 hours ago",
            UserStatus::Active,
        ),
        user(
            "user-2",
            "Manager",
            UserRole::FacilityManager,
            "manager@example.com",
            "1 day ago",
            UserStatus::Active,
        ),
        user(
            "user-3",
            "Standard",
            UserRole::StandardUser,
            "user@example.com",
            "3 days ago",
            UserStatus::Inactive,
        ),
    ]
}

fn floor(name: &str, image_url: &str, bin_id: &str, x: f64, y: f64) -> Floor {
    Floor {
        name: name.to_string(),
        image_url: image_url.to_string(),
        bins: vec![FloorBin {
            id: bin_id.to_string(),
            x,
            y,
        }],
    }
}

pub fn demo_floors() -> Vec<Floor> {
    vec![
        floor(
            "Ground Floor",
            "https://placehold.co/1200x800/e2e8f0/64748b?text=Ground+Floor+Layout",
            "SB-102",
            25.0,
            50.0,
        ),
        floor(
            "1st Floor",
            "https://placehold.co/1200x800/dbeafe/4b5563?text=1st+Floor+Layout",
            "SB-101",
            60.0,
            40.0,
        ),
        floor(
            "2nd Floor",
            "https://placehold.co/1200x800/d1fae5/374151?text=2nd+Floor+Layout",
            "SB-103",
            75.0,
            70.0,
        ),
    ]
}
