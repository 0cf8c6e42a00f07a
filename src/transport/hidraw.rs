//! Controller discovery on Linux hidraw
//!
//! Each `/sys/class/hidraw/hidrawN/device/uevent` carries a
//! `HID_ID=BUS:VENDOR:PRODUCT` line; nodes whose vendor and product match a
//! known controller are reported with their `/dev/hidrawN` path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sony vendor id
pub const CONTROLLER_VENDOR_ID: u16 = 0x054C;

/// First and second revision controller product ids
pub const CONTROLLER_PRODUCT_IDS: [u16; 2] = [0x05C4, 0x09CC];

const BUS_USB: u16 = 0x0003;
const BUS_BLUETOOTH: u16 = 0x0005;

/// Parsed `HID_ID` triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidId {
    pub bus: u16,
    pub vendor: u16,
    pub product: u16,
}

impl HidId {
    pub fn is_controller(&self) -> bool {
        self.vendor == CONTROLLER_VENDOR_ID && CONTROLLER_PRODUCT_IDS.contains(&self.product)
    }

    pub fn is_bluetooth(&self) -> bool {
        self.bus == BUS_BLUETOOTH
    }

    pub fn is_usb(&self) -> bool {
        self.bus == BUS_USB
    }
}

/// A controller found on the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInfo {
    /// Device node to open for writing
    pub path: PathBuf,
    pub id: HidId,
    /// `HID_NAME` from the uevent, if present
    pub name: Option<String>,
}

/// Extract the `HID_ID` line from a uevent file.
///
/// Fields are hex, e.g. `HID_ID=0005:0000054C:000009CC`.
pub fn parse_hid_id(uevent: &str) -> Option<HidId> {
    let value = uevent
        .lines()
        .find_map(|line| line.trim().strip_prefix("HID_ID="))?;

    let mut parts = value.split(':');
    let bus = u32::from_str_radix(parts.next()?, 16).ok()?;
    let vendor = u32::from_str_radix(parts.next()?, 16).ok()?;
    let product = u32::from_str_radix(parts.next()?, 16).ok()?;
    if parts.next().is_some() {
        return None;
    }

    Some(HidId {
        bus: u16::try_from(bus).ok()?,
        vendor: u16::try_from(vendor).ok()?,
        product: u16::try_from(product).ok()?,
    })
}

fn parse_hid_name(uevent: &str) -> Option<String> {
    uevent
        .lines()
        .find_map(|line| line.trim().strip_prefix("HID_NAME="))
        .map(str::to_string)
}

/// Scan a sysfs hidraw class directory, mapping matches to `dev_root`
fn scan(class_root: &Path, dev_root: &Path) -> io::Result<Vec<ControllerInfo>> {
    let mut found = Vec::new();

    for entry in fs::read_dir(class_root)? {
        let entry = entry?;
        let node = entry.file_name();

        let uevent = match fs::read_to_string(entry.path().join("device").join("uevent")) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("Skipping {:?}: {}", node, e);
                continue;
            }
        };

        let Some(id) = parse_hid_id(&uevent) else {
            continue;
        };
        if !id.is_controller() {
            continue;
        }

        found.push(ControllerInfo {
            path: dev_root.join(&node),
            id,
            name: parse_hid_name(&uevent),
        });
    }

    // Bluetooth first: the audio reports are only accepted over Bluetooth
    found.sort_by(|a, b| {
        b.id.is_bluetooth()
            .cmp(&a.id.is_bluetooth())
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(found)
}

/// List connected controllers, Bluetooth connections first
#[cfg(target_os = "linux")]
pub fn find_controllers() -> Vec<ControllerInfo> {
    match scan(Path::new("/sys/class/hidraw"), Path::new("/dev")) {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Failed to scan hidraw devices: {}", e);
            Vec::new()
        }
    }
}

/// List connected controllers, Bluetooth connections first
#[cfg(not(target_os = "linux"))]
pub fn find_controllers() -> Vec<ControllerInfo> {
    tracing::debug!("Controller discovery is only available on Linux");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_node(class_root: &Path, node: &str, uevent: &str) {
        let device = class_root.join(node).join("device");
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("uevent"), uevent).unwrap();
    }

    #[test]
    fn test_parse_hid_id() {
        let uevent = "DRIVER=sony\nHID_ID=0005:0000054C:000009CC\nHID_NAME=Wireless Controller\n";
        let id = parse_hid_id(uevent).unwrap();
        assert_eq!(
            id,
            HidId {
                bus: 0x0005,
                vendor: 0x054C,
                product: 0x09CC
            }
        );
        assert!(id.is_controller());
        assert!(id.is_bluetooth());
        assert_eq!(parse_hid_name(uevent).as_deref(), Some("Wireless Controller"));
    }

    #[test]
    fn test_parse_hid_id_rejects_garbage() {
        assert!(parse_hid_id("DRIVER=hid-generic\n").is_none());
        assert!(parse_hid_id("HID_ID=0003:zz:0001\n").is_none());
        assert!(parse_hid_id("HID_ID=0003:0000046D\n").is_none());
        assert!(parse_hid_id("HID_ID=0003:0000046D:0000C52B:1\n").is_none());
    }

    #[test]
    fn test_other_vendors_are_not_controllers() {
        let id = parse_hid_id("HID_ID=0003:0000046D:0000C52B").unwrap();
        assert!(!id.is_controller());
        assert!(id.is_usb());
    }

    #[test]
    fn test_scan_orders_bluetooth_first() {
        let sys = tempfile::tempdir().unwrap();
        add_node(sys.path(), "hidraw0", "HID_ID=0003:0000046D:0000C52B\n");
        add_node(sys.path(), "hidraw1", "HID_ID=0003:0000054C:000005C4\n");
        add_node(sys.path(), "hidraw2", "HID_ID=0005:0000054C:000009CC\nHID_NAME=Wireless Controller\n");
        fs::create_dir_all(sys.path().join("hidraw3")).unwrap();

        let found = scan(sys.path(), Path::new("/dev")).unwrap();
        let paths: Vec<_> = found.iter().map(|c| c.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/dev/hidraw2"), PathBuf::from("/dev/hidraw1")]
        );
        assert_eq!(found[0].name.as_deref(), Some("Wireless Controller"));
        assert_eq!(found[1].name, None);
    }
}
