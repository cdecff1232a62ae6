//! BLE GATT adapter for the VeloNav service.
//!
//! Implements [`Notifier`] and feeds every GATT write into
//! [`LINK_CHANNEL`] for the main loop.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid BLE GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: simulation that records notifications for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Characteristic      | UUID                         | Perms         |
//! |---------------------|------------------------------|---------------|
//! | Tile upload         | `7b1e0001-…-b0a7c5e2d4f6`    | Write+Notify  |
//! | Trip upload         | `7b1e0002-…-b0a7c5e2d4f6`    | Write         |
//! | Weather             | `7b1e0003-…-b0a7c5e2d4f6`    | Write         |
//! | Radar               | `7b1e0004-…-b0a7c5e2d4f6`    | Write         |
//! | Notification        | `7b1e0005-…-b0a7c5e2d4f6`    | Write         |
//! | Device status       | `7b1e0006-…-b0a7c5e2d4f6`    | Write         |
//! | Trip control        | `7b1e0007-…-b0a7c5e2d4f6`    | Write+Notify  |
//! | Recording control   | `7b1e0008-…-b0a7c5e2d4f6`    | Write+Notify  |
//! | Tile inventory      | `7b1e0009-…-b0a7c5e2d4f6`    | Notify        |
//! | Recording transfer  | `7b1e000a-…-b0a7c5e2d4f6`    | Notify        |

use log::{info, warn};

use crate::error::NotifyError;
use crate::link::transport::{MAX_NOTIFY_LEN, Notifier};
use crate::link::{Characteristic, SERVICE_UUID};

#[cfg(target_os = "espidf")]
use log::error;

/// ATT MTU requested from the phone (512-byte payload + 3-byte header + slack).
pub const LOCAL_MTU: u16 = crate::link::transport::ATT_MAX_MTU;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF Bluedroid glue
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. Handles live in atomics; data goes straight into the link
// channel, so nothing else is shared with the callback task.

#[cfg(target_os = "espidf")]
mod gatt {
    use core::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};

    use esp_idf_svc::sys::*;

    use crate::link::channels::{self, LINK_CHANNEL, LinkEvent};
    use crate::link::{Characteristic, SERVICE_UUID};

    pub static GATTS_IF: AtomicU16 = AtomicU16::new(0);
    pub static CONN_ID: AtomicU16 = AtomicU16::new(0);
    pub static CONNECTED: AtomicBool = AtomicBool::new(false);
    static SVC_HANDLE: AtomicU16 = AtomicU16::new(0);
    /// Index into [`Characteristic::ALL`] of the characteristic being registered.
    static REG_STEP: AtomicUsize = AtomicUsize::new(0);

    const COUNT: usize = Characteristic::ALL.len();
    pub static CHAR_HANDLES: [AtomicU16; COUNT] = [const { AtomicU16::new(0) }; COUNT];

    /// Service, one declaration + value per characteristic, one CCCD per notifier.
    const SERVICE_HANDLES: u16 = 1 + 2 * COUNT as u16 + COUNT as u16;

    const CCCD_UUID: u16 = 0x2902;

    fn uuid128_to_esp(uuid: u128) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = 16;
        t.uuid.uuid128 = uuid.to_le_bytes();
        t
    }

    pub fn handle_of(ch: Characteristic) -> u16 {
        CHAR_HANDLES[ch.index()].load(Ordering::Relaxed)
    }

    fn characteristic_at(handle: u16) -> Option<Characteristic> {
        Characteristic::ALL
            .into_iter()
            .find(|&c| handle != 0 && handle_of(c) == handle)
    }

    unsafe fn add_char(svc_handle: u16, ch: Characteristic) {
        let mut perm = 0;
        let mut prop = 0;
        if ch.is_inbound() {
            perm |= ESP_GATT_PERM_WRITE;
            prop |= ESP_GATT_CHAR_PROP_BIT_WRITE | ESP_GATT_CHAR_PROP_BIT_WRITE_NR;
        }
        if ch.notifies() {
            prop |= ESP_GATT_CHAR_PROP_BIT_NOTIFY;
        }
        let mut uuid = uuid128_to_esp(ch.uuid());
        unsafe {
            esp_ble_gatts_add_char(
                svc_handle,
                &mut uuid,
                perm as esp_gatt_perm_t,
                prop as esp_gatt_char_prop_t,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    unsafe fn add_cccd(svc_handle: u16) {
        let mut uuid: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        uuid.len = 2;
        uuid.uuid.uuid16 = CCCD_UUID;
        unsafe {
            esp_ble_gatts_add_char_descr(
                svc_handle,
                &mut uuid,
                (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    /// Register the characteristic after `done`, or finish.
    unsafe fn register_next(svc_handle: u16) {
        let next = REG_STEP.fetch_add(1, Ordering::Relaxed) + 1;
        match Characteristic::ALL.get(next) {
            Some(&ch) => unsafe { add_char(svc_handle, ch) },
            None => log::info!("BLE GATTS: all {} characteristics registered", COUNT),
        }
    }

    pub unsafe fn start_advertising() {
        let mut adv_params = esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..unsafe { core::mem::zeroed() }
        };
        unsafe {
            esp_ble_gap_start_advertising(&mut adv_params);
        }
    }

    pub unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        _param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                log::info!("BLE GAP: advertising started");
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
                log::info!("BLE GAP: advertising stopped");
            }
            _ => {}
        }
    }

    pub unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        GATTS_IF.store(u16::from(gatts_if), Ordering::Relaxed);

        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                log::info!("BLE GATTS: app registered (if={})", gatts_if);
                let mut svc_id = esp_gatt_srvc_id_t {
                    id: esp_gatt_id_t {
                        uuid: uuid128_to_esp(SERVICE_UUID),
                        inst_id: 0,
                    },
                    is_primary: true,
                };
                unsafe {
                    esp_ble_gatts_create_service(gatts_if, &mut svc_id, SERVICE_HANDLES);
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let svc_handle = unsafe { (*param).create.service_handle };
                SVC_HANDLE.store(svc_handle, Ordering::Relaxed);
                log::info!("BLE GATTS: service created (handle={})", svc_handle);
                REG_STEP.store(0, Ordering::Relaxed);
                unsafe {
                    esp_ble_gatts_start_service(svc_handle);
                    add_char(svc_handle, Characteristic::ALL[0]);
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let handle = unsafe { (*param).add_char.attr_handle };
                let svc_handle = SVC_HANDLE.load(Ordering::Relaxed);
                let step = REG_STEP.load(Ordering::Relaxed);
                let Some(&ch) = Characteristic::ALL.get(step) else {
                    return;
                };
                CHAR_HANDLES[ch.index()].store(handle, Ordering::Relaxed);
                log::info!("BLE GATTS: {} char (handle={})", ch, handle);
                if ch.notifies() {
                    unsafe { add_cccd(svc_handle) };
                } else {
                    unsafe { register_next(svc_handle) };
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
                unsafe { register_next(SVC_HANDLE.load(Ordering::Relaxed)) };
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                let conn_id = unsafe { (*param).connect.conn_id };
                CONN_ID.store(conn_id, Ordering::Relaxed);
                CONNECTED.store(true, Ordering::Release);
                log::info!("BLE GATTS: phone connected (conn_id={})", conn_id);
                channels::push(&LINK_CHANNEL, LinkEvent::Connected);
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                CONNECTED.store(false, Ordering::Release);
                log::info!("BLE GATTS: phone disconnected");
                channels::push(&LINK_CHANNEL, LinkEvent::Disconnected);
                unsafe { start_advertising() };
            }
            esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
                let mtu = unsafe { (*param).mtu.mtu };
                log::info!("BLE GATTS: MTU {}", mtu);
                channels::push(&LINK_CHANNEL, LinkEvent::MtuChanged(mtu));
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = unsafe { &(*param).write };
                if p.is_prep {
                    log::warn!("BLE GATTS: prepared write on handle {} ignored", p.handle);
                    return;
                }
                let data = unsafe { core::slice::from_raw_parts(p.value, usize::from(p.len)) };
                let queued = match characteristic_at(p.handle) {
                    Some(ch) => channels::push_write(&LINK_CHANNEL, ch, data),
                    None => true,
                };
                if p.need_rsp {
                    // A refused write is reported to the phone as well as
                    // to the main loop.
                    let status = if queued {
                        esp_gatt_status_t_ESP_GATT_OK
                    } else {
                        esp_gatt_status_t_ESP_GATT_NO_RESOURCES
                    };
                    unsafe {
                        esp_ble_gatts_send_response(
                            gatts_if,
                            p.conn_id,
                            p.trans_id,
                            status,
                            core::ptr::null_mut(),
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    device_name: heapless::String<24>,
    /// Simulation: every accepted notification, oldest first.
    #[cfg(not(target_os = "espidf"))]
    sim_sent: Vec<(Characteristic, heapless::Vec<u8, MAX_NOTIFY_LEN>)>,
}

impl BleAdapter {
    pub fn new(device_name: heapless::String<24>) -> Self {
        Self {
            state: BleState::Idle,
            device_name,
            #[cfg(not(target_os = "espidf"))]
            sim_sent: Vec::new(),
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == BleState::Connected
    }

    pub fn start(&mut self) {
        info!("BLE: starting advertising as '{}'", self.device_name);
        self.platform_start();
        if self.state != BleState::Failed {
            self.state = BleState::Advertising;
        }
    }

    pub fn stop(&mut self) {
        self.platform_stop();
        self.state = BleState::Idle;
        info!("BLE: stopped");
    }

    /// Mirror a connect event drained from the link channel.
    pub fn on_central_connected(&mut self) {
        info!("BLE: phone connected");
        self.state = BleState::Connected;
    }

    pub fn on_central_disconnected(&mut self) {
        info!("BLE: phone disconnected");
        if self.state != BleState::Idle {
            self.state = BleState::Advertising;
        }
    }

    /// Simulation: notifications sent so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_take_sent(&mut self) -> Vec<(Characteristic, heapless::Vec<u8, MAX_NOTIFY_LEN>)> {
        core::mem::take(&mut self.sim_sent)
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            let steps: [(&str, i32); 4] = [
                ("bt_controller_init", esp_bt_controller_init(&mut bt_cfg)),
                (
                    "bt_controller_enable",
                    esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                ),
                ("bluedroid_init", esp_bluedroid_init()),
                ("bluedroid_enable", esp_bluedroid_enable()),
            ];
            for (what, ret) in steps {
                if ret != ESP_OK as i32 {
                    error!("BLE: {} failed ({})", what, ret);
                    self.state = BleState::Failed;
                    return;
                }
            }

            esp_ble_gap_register_callback(Some(gatt::gap_event_handler));
            esp_ble_gatts_register_callback(Some(gatt::gatts_event_handler));
            esp_ble_gatts_app_register(0);
            esp_ble_gatt_set_local_mtu(LOCAL_MTU);

            let mut name = heapless::Vec::<u8, 25>::new();
            let _ = name.extend_from_slice(self.device_name.as_bytes());
            let _ = name.push(0);
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);

            gatt::start_advertising();
            info!(
                "BLE(espidf): Bluedroid up, advertising as '{}'",
                self.device_name
            );
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("BLE(sim): stopped");
    }

    #[cfg(target_os = "espidf")]
    fn platform_notify(&mut self, ch: Characteristic, data: &[u8]) -> Result<(), NotifyError> {
        use core::sync::atomic::Ordering;
        use esp_idf_svc::sys::*;

        if !gatt::CONNECTED.load(Ordering::Acquire) {
            return Err(NotifyError::NotConnected);
        }
        let handle = gatt::handle_of(ch);
        if handle == 0 {
            return Err(NotifyError::NotConnected);
        }
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                gatt::GATTS_IF.load(Ordering::Relaxed) as esp_gatt_if_t,
                gatt::CONN_ID.load(Ordering::Relaxed),
                handle,
                data.len() as u16,
                data.as_ptr() as *mut u8,
                false,
            )
        };
        if ret == ESP_OK as i32 {
            Ok(())
        } else {
            Err(NotifyError::Congested)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&mut self, ch: Characteristic, data: &[u8]) -> Result<(), NotifyError> {
        if self.state != BleState::Connected {
            return Err(NotifyError::NotConnected);
        }
        let frame = heapless::Vec::from_slice(data).map_err(|()| NotifyError::TooLarge)?;
        self.sim_sent.push((ch, frame));
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Notifier implementation
// ───────────────────────────────────────────────────────────────

impl Notifier for BleAdapter {
    fn notify(&mut self, characteristic: Characteristic, data: &[u8]) -> Result<(), NotifyError> {
        if !characteristic.notifies() {
            warn!("BLE: {} does not notify", characteristic);
            return Err(NotifyError::NotConnected);
        }
        if data.len() > MAX_NOTIFY_LEN {
            return Err(NotifyError::TooLarge);
        }
        self.platform_notify(characteristic, data)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
