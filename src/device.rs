//! USB vendor/product identification for common ESP32 bridges.
//!
//! Only the chips ESP32 boards ship with are known: the Silicon Labs UART
//! bridges and Espressif's native USB.

use serde::Serialize;

/// A known USB vendor and the products recognised for it.
#[derive(Debug, Clone, Copy)]
pub struct UsbVendor {
    pub vid: u16,
    pub name: &'static str,
    pub products: &'static [(u16, &'static str)],
}

/// Vendor/product table for ESP32 boards.
pub const ESP_USB_VENDORS: &[UsbVendor] = &[
    UsbVendor {
        vid: 0x10C4,
        name: "Silicon Labs",
        products: &[(0xEA60, "CP2102/CP2104")],
    },
    UsbVendor {
        vid: 0x303A,
        name: "Espressif",
        products: &[
            (0x0002, "ESP32-S2"),
            (0x1001, "ESP32-S3/C3/C5/C6/C61/H2/P4"),
        ],
    },
];

/// What is known about a USB device. Ids are rendered as `0xEA60`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbDeviceInfo {
    pub vid: String,
    pub vendor: Option<String>,
    pub pid: String,
    pub product: Option<String>,
}

/// Look up the vendor and product names for `vid`/`pid`.
pub fn identify_usb_device(vid: u16, pid: u16) -> UsbDeviceInfo {
    let vendor = ESP_USB_VENDORS.iter().find(|v| v.vid == vid);
    let product = vendor.and_then(|v| {
        v.products
            .iter()
            .find(|(id, _)| *id == pid)
            .map(|(_, name)| name.to_string())
    });

    UsbDeviceInfo {
        vid: usb_id_int_to_hex(vid),
        vendor: vendor.map(|v| v.name.to_string()),
        pid: usb_id_int_to_hex(pid),
        product,
    }
}

/// Render a USB id as `0x` followed by upper-case hex digits.
pub fn usb_id_int_to_hex(id: u16) -> String {
    format!("0x{id:X}")
}

/// Parse a hex USB id, with or without a `0x` prefix.
pub fn usb_id_hex_to_int(hex: &str) -> Option<u16> {
    let hex = hex.trim();
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    u16::from_str_radix(digits, 16).ok()
}
