//! Input driver category
//!
//! Digital joypad-style input behind the driver registry. Logical buttons are
//! bound to keyboard keys and/or physical pad buttons through per-port
//! binding tables; the fast-forward toggle is tracked as a side effect of
//! joypad state queries, the way the frontend core expects it.

use crate::config::InputSettings;
use crate::driver::{DriverIdent, DriverRegistry, LifecycleHooks};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use winit::keyboard::KeyCode;

/// Input errors
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input backend error: {0}")]
    Backend(String),
}

pub type InputResult<T> = Result<T, InputError>;

/// Physical joypads serviced per session.
pub const MAX_JOYPADS: usize = 2;
/// Reported button count per pad is capped to bound state buffers.
pub const MAX_JOYPAD_BUTTONS: usize = 128;

// ============================================================================
// Bindings
// ============================================================================

/// Device categories a query can name. Only `Joypad` is serviced by the
/// compiled-in drivers; everything else reads as released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceClass {
    Joypad,
    Mouse,
    Lightgun,
}

/// Logical button ids, independent of any physical layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalInput {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    X,
    Y,
    L,
    R,
    Select,
    Start,
    FastForward,
}

/// One logical-to-physical binding. Either side may be absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InputBinding {
    pub id: LogicalInput,
    pub key: Option<KeyCode>,
    pub joypad_button: Option<u32>,
}

impl InputBinding {
    pub fn new(id: LogicalInput, key: Option<KeyCode>, joypad_button: Option<u32>) -> Self {
        Self {
            id,
            key,
            joypad_button,
        }
    }
}

/// Ordered per-port binding lists. Read-only after load; the list length is
/// explicit, there is no terminator entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingTable {
    ports: Vec<Vec<InputBinding>>,
}

impl BindingTable {
    pub fn new(ports: Vec<Vec<InputBinding>>) -> Self {
        Self { ports }
    }

    /// Bindings for `port`; unbound ports read as empty.
    pub fn port(&self, port: usize) -> &[InputBinding] {
        self.ports.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ports(&self) -> usize {
        self.ports.len()
    }
}

impl Default for BindingTable {
    fn default() -> Self {
        use LogicalInput::*;
        let port0 = vec![
            InputBinding::new(Up, Some(KeyCode::ArrowUp), None),
            InputBinding::new(Down, Some(KeyCode::ArrowDown), None),
            InputBinding::new(Left, Some(KeyCode::ArrowLeft), None),
            InputBinding::new(Right, Some(KeyCode::ArrowRight), None),
            InputBinding::new(A, Some(KeyCode::KeyZ), Some(1)),
            InputBinding::new(B, Some(KeyCode::KeyX), Some(0)),
            InputBinding::new(X, Some(KeyCode::KeyA), Some(3)),
            InputBinding::new(Y, Some(KeyCode::KeyS), Some(2)),
            InputBinding::new(L, Some(KeyCode::KeyQ), Some(4)),
            InputBinding::new(R, Some(KeyCode::KeyW), Some(5)),
            InputBinding::new(Select, Some(KeyCode::Space), Some(6)),
            InputBinding::new(Start, Some(KeyCode::Enter), Some(7)),
            InputBinding::new(FastForward, Some(KeyCode::Tab), None),
        ];
        // Second player has no keyboard half by default
        let port1 = vec![
            InputBinding::new(Up, None, Some(12)),
            InputBinding::new(Down, None, Some(13)),
            InputBinding::new(Left, None, Some(14)),
            InputBinding::new(Right, None, Some(15)),
            InputBinding::new(A, None, Some(1)),
            InputBinding::new(B, None, Some(0)),
            InputBinding::new(Start, None, Some(7)),
        ];
        Self {
            ports: vec![port0, port1],
        }
    }
}

/// Currently-pressed keys, fed from window events by the frontend.
#[derive(Debug, Default)]
pub struct KeyboardState {
    pressed: HashSet<KeyCode>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.pressed.insert(key);
        } else {
            self.pressed.remove(&key);
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }
}

// ============================================================================
// Joypad Source
// ============================================================================

#[derive(Debug, Clone)]
pub struct JoypadInfo {
    pub name: String,
    pub buttons: usize,
}

/// Seam over the physical pad API so joypad state can be driven without
/// hardware in tests.
pub trait JoypadSource {
    /// Connected pads, at most `max_pads`. Called once per session; the
    /// result is cached for the process lifetime (hot-plug is unsupported).
    fn enumerate(&mut self, max_pads: usize) -> Vec<JoypadInfo>;

    /// Refresh pressed state for pad `slot` into `buttons`.
    fn poll_buttons(&mut self, slot: usize, buttons: &mut [bool]);

    /// Drain pending device events. Default: nothing to pump.
    fn pump_events(&mut self) {}
}

/// gilrs-backed pad source.
pub struct GilrsSource {
    gilrs: gilrs::Gilrs,
    ids: Vec<gilrs::GamepadId>,
}

impl GilrsSource {
    pub fn new() -> InputResult<Self> {
        let gilrs = gilrs::Gilrs::new().map_err(|e| InputError::Backend(e.to_string()))?;
        Ok(Self {
            gilrs,
            ids: Vec::new(),
        })
    }
}

impl JoypadSource for GilrsSource {
    fn enumerate(&mut self, max_pads: usize) -> Vec<JoypadInfo> {
        while self.gilrs.next_event().is_some() {}

        self.ids.clear();
        let mut found = Vec::new();
        for (id, pad) in self.gilrs.gamepads() {
            if found.len() >= max_pads {
                break;
            }
            let buttons = pad.state().buttons().count().min(MAX_JOYPAD_BUTTONS);
            found.push(JoypadInfo {
                name: pad.name().to_string(),
                buttons,
            });
            self.ids.push(id);
        }
        found
    }

    fn poll_buttons(&mut self, slot: usize, buttons: &mut [bool]) {
        while self.gilrs.next_event().is_some() {}

        let Some(&id) = self.ids.get(slot) else {
            return;
        };
        let pad = self.gilrs.gamepad(id);
        for (i, (_code, data)) in pad.state().buttons().enumerate() {
            if i >= buttons.len() {
                break;
            }
            buttons[i] = data.is_pressed();
        }
    }

    fn pump_events(&mut self) {
        while self.gilrs.next_event().is_some() {}
    }
}

/// Pad source used when the gamepad backend is unavailable.
struct NoJoypads;

impl JoypadSource for NoJoypads {
    fn enumerate(&mut self, _max_pads: usize) -> Vec<JoypadInfo> {
        Vec::new()
    }

    fn poll_buttons(&mut self, _slot: usize, _buttons: &mut [bool]) {}
}

// ============================================================================
// Contract
// ============================================================================

/// Static descriptor of a compiled-in input backend.
pub trait InputDriver {
    fn ident(&self) -> &'static str;
    fn init(&self) -> InputResult<Box<dyn InputSession>>;
}

impl DriverIdent for Box<dyn InputDriver> {
    fn ident(&self) -> &'static str {
        self.as_ref().ident()
    }
}

/// One live input session. Default bodies mean "not serviced".
pub trait InputSession {
    /// Pump pending device events. Called once per frontend tick.
    fn poll(&mut self) {}

    /// Forward a window-system key transition into the driver.
    fn key_event(&mut self, _key: KeyCode, _pressed: bool) {}

    /// Digital state query: 1 when the first binding for `id` on `port` is
    /// held, else 0. Non-joypad devices always read 0.
    fn state(
        &mut self,
        _bindings: &BindingTable,
        _port: usize,
        _device: DeviceClass,
        _index: u32,
        _id: LogicalInput,
    ) -> i16 {
        0
    }

    /// Fast-forward toggle, updated as a side effect of joypad queries.
    fn fast_forward(&self) -> bool {
        false
    }
}

pub type InputRegistry = DriverRegistry<Box<dyn InputDriver>>;

/// Input backends compiled into this frontend, in priority order.
pub fn builtin_drivers() -> Vec<Box<dyn InputDriver>> {
    vec![Box::new(WinitInputDriver), Box::new(NullInputDriver)]
}

// ============================================================================
// Winit Backend
// ============================================================================

/// Keyboard state from the window system plus physical pads via gilrs.
pub struct WinitInputDriver;

impl InputDriver for WinitInputDriver {
    fn ident(&self) -> &'static str {
        "winit"
    }

    fn init(&self) -> InputResult<Box<dyn InputSession>> {
        let source: Box<dyn JoypadSource> = match GilrsSource::new() {
            Ok(source) => Box::new(source),
            Err(e) => {
                tracing::warn!("joypad support unavailable: {}", e);
                Box::new(NoJoypads)
            }
        };
        Ok(Box::new(WinitInputSession::new(source)))
    }
}

struct JoypadSlot {
    buttons: [bool; MAX_JOYPAD_BUTTONS],
    count: usize,
}

pub struct WinitInputSession {
    keyboard: KeyboardState,
    source: Box<dyn JoypadSource>,
    /// None until the first state query; enumeration happens once and is
    /// cached for the process lifetime.
    pads: Option<Vec<JoypadSlot>>,
    fast_forward: bool,
}

impl WinitInputSession {
    fn new(source: Box<dyn JoypadSource>) -> Self {
        Self {
            keyboard: KeyboardState::new(),
            source,
            pads: None,
            fast_forward: false,
        }
    }

    fn ensure_pads(&mut self) {
        if self.pads.is_some() {
            return;
        }
        let infos = self.source.enumerate(MAX_JOYPADS);
        for (slot, info) in infos.iter().enumerate() {
            tracing::info!("Joypad #{}: {} ({} buttons)", slot, info.name, info.buttons);
        }
        self.pads = Some(
            infos
                .iter()
                .map(|info| JoypadSlot {
                    buttons: [false; MAX_JOYPAD_BUTTONS],
                    count: info.buttons.min(MAX_JOYPAD_BUTTONS),
                })
                .collect(),
        );
    }
}

fn binding_pressed(
    keyboard: &KeyboardState,
    binding: &InputBinding,
    pad: Option<&JoypadSlot>,
) -> bool {
    if let Some(key) = binding.key {
        if keyboard.is_pressed(key) {
            return true;
        }
    }
    if let (Some(button), Some(slot)) = (binding.joypad_button, pad) {
        let button = button as usize;
        if button < slot.count && slot.buttons[button] {
            return true;
        }
    }
    false
}

impl InputSession for WinitInputSession {
    fn poll(&mut self) {
        // The window system pumps its own queue through the event loop;
        // device events still need draining here.
        self.source.pump_events();
    }

    fn key_event(&mut self, key: KeyCode, pressed: bool) {
        self.keyboard.set(key, pressed);
    }

    fn state(
        &mut self,
        bindings: &BindingTable,
        port: usize,
        device: DeviceClass,
        _index: u32,
        id: LogicalInput,
    ) -> i16 {
        if device != DeviceClass::Joypad {
            return 0;
        }

        self.ensure_pads();

        // Refresh the queried port's buttons from the pad backend
        if let Some(pads) = self.pads.as_mut() {
            if let Some(slot) = pads.get_mut(port) {
                let count = slot.count;
                self.source.poll_buttons(port, &mut slot.buttons[..count]);
            }
        }

        let Some(pads) = self.pads.as_ref() else {
            return 0;
        };
        let pad = pads.get(port);
        let binds = bindings.port(port);

        // Fast-forward state rides along with every joypad query
        for binding in binds {
            if binding.id == LogicalInput::FastForward {
                self.fast_forward = binding_pressed(&self.keyboard, binding, pad);
                break;
            }
        }

        // First binding for the requested id decides
        for binding in binds {
            if binding.id == id {
                return i16::from(binding_pressed(&self.keyboard, binding, pad));
            }
        }

        0
    }

    fn fast_forward(&self) -> bool {
        self.fast_forward
    }
}

// ============================================================================
// Null Backend
// ============================================================================

/// Fallback backend: every query reads as released.
pub struct NullInputDriver;

impl InputDriver for NullInputDriver {
    fn ident(&self) -> &'static str {
        "null"
    }

    fn init(&self) -> InputResult<Box<dyn InputSession>> {
        Ok(Box::new(NullInputSession))
    }
}

struct NullInputSession;

impl InputSession for NullInputSession {}

// ============================================================================
// Input System
// ============================================================================

/// Owns the single live input session and the binding table consulted by
/// every query.
pub struct InputSystem {
    registry: InputRegistry,
    settings: InputSettings,
    session: Option<Box<dyn InputSession>>,
    active: bool,
    hooks: LifecycleHooks,
}

impl InputSystem {
    pub fn new(registry: InputRegistry, settings: InputSettings) -> Self {
        Self {
            registry,
            settings,
            session: None,
            active: false,
            hooks: LifecycleHooks::new(),
        }
    }

    pub fn hooks_mut(&mut self) -> &mut LifecycleHooks {
        &mut self.hooks
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Resolve the configured driver and bring up an input session. A second
    /// call while a session is live is a guarded no-op.
    pub fn init_once(&mut self) {
        if self.session.is_some() {
            tracing::debug!("input already initialized, ignoring");
            return;
        }

        let index = self.registry.resolve(&self.settings.driver);
        let driver = self.registry.get(index);

        match driver.init() {
            Ok(session) => {
                tracing::info!("Input driver \"{}\" initialized", driver.ident());
                self.session = Some(session);
                self.active = true;
                self.hooks.fire_initialized();
            }
            Err(e) => {
                tracing::error!("Failed to initialize input driver: {}", e);
                self.active = false;
            }
        }
    }

    pub fn poll(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.poll();
        }
    }

    pub fn key_event(&mut self, key: KeyCode, pressed: bool) {
        if let Some(session) = self.session.as_mut() {
            session.key_event(key, pressed);
        }
    }

    /// Digital state query against the loaded binding table.
    pub fn state(&mut self, port: usize, device: DeviceClass, index: u32, id: LogicalInput) -> i16 {
        match self.session.as_mut() {
            Some(session) => session.state(&self.settings.bindings, port, device, index, id),
            None => 0,
        }
    }

    pub fn fast_forward(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.fast_forward())
            .unwrap_or(false)
    }

    /// Tear down the session. Idempotent.
    pub fn free(&mut self) {
        if self.session.is_some() {
            self.hooks.fire_deinitialized();
        }
        self.session = None;
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct FakeSource {
        enumerations: Rc<Cell<u32>>,
        pads: Vec<JoypadInfo>,
        pressed: Rc<RefCell<Vec<Vec<bool>>>>,
    }

    impl JoypadSource for FakeSource {
        fn enumerate(&mut self, max_pads: usize) -> Vec<JoypadInfo> {
            self.enumerations.set(self.enumerations.get() + 1);
            self.pads.iter().take(max_pads).cloned().collect()
        }

        fn poll_buttons(&mut self, slot: usize, buttons: &mut [bool]) {
            let pressed = self.pressed.borrow();
            let Some(state) = pressed.get(slot) else {
                return;
            };
            for (i, value) in state.iter().enumerate() {
                if i >= buttons.len() {
                    break;
                }
                buttons[i] = *value;
            }
        }
    }

    fn session_with_pad(
        buttons: usize,
        pressed: Rc<RefCell<Vec<Vec<bool>>>>,
        enumerations: Rc<Cell<u32>>,
    ) -> WinitInputSession {
        WinitInputSession::new(Box::new(FakeSource {
            enumerations,
            pads: vec![JoypadInfo {
                name: "Fake Pad".to_string(),
                buttons,
            }],
            pressed,
        }))
    }

    fn table(bindings: Vec<InputBinding>) -> BindingTable {
        BindingTable::new(vec![bindings])
    }

    #[test]
    fn test_non_joypad_device_reads_zero() {
        let pressed = Rc::new(RefCell::new(vec![vec![true; 16]]));
        let mut session = session_with_pad(16, pressed, Rc::new(Cell::new(0)));
        session.key_event(KeyCode::KeyZ, true);

        let binds = table(vec![InputBinding::new(
            LogicalInput::A,
            Some(KeyCode::KeyZ),
            Some(0),
        )]);

        assert_eq!(
            session.state(&binds, 0, DeviceClass::Mouse, 0, LogicalInput::A),
            0
        );
        assert_eq!(
            session.state(&binds, 0, DeviceClass::Lightgun, 0, LogicalInput::A),
            0
        );
        assert_eq!(
            session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::A),
            1
        );
    }

    #[test]
    fn test_keyboard_binding() {
        let pressed = Rc::new(RefCell::new(vec![vec![false; 16]]));
        let mut session = session_with_pad(16, pressed, Rc::new(Cell::new(0)));

        let binds = table(vec![InputBinding::new(
            LogicalInput::A,
            Some(KeyCode::KeyZ),
            None,
        )]);

        assert_eq!(
            session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::A),
            0
        );
        session.key_event(KeyCode::KeyZ, true);
        assert_eq!(
            session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::A),
            1
        );
        session.key_event(KeyCode::KeyZ, false);
        assert_eq!(
            session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::A),
            0
        );
    }

    #[test]
    fn test_joypad_button_in_range() {
        let pressed = Rc::new(RefCell::new(vec![vec![false; 16]]));
        let mut session = session_with_pad(16, pressed.clone(), Rc::new(Cell::new(0)));

        let binds = table(vec![InputBinding::new(LogicalInput::B, None, Some(3))]);

        assert_eq!(
            session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::B),
            0
        );
        pressed.borrow_mut()[0][3] = true;
        assert_eq!(
            session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::B),
            1
        );
    }

    #[test]
    fn test_joypad_button_out_of_range_reads_zero() {
        // Pad reports 4 buttons; a binding past that range never fires
        let pressed = Rc::new(RefCell::new(vec![vec![true; 16]]));
        let mut session = session_with_pad(4, pressed, Rc::new(Cell::new(0)));

        let binds = table(vec![InputBinding::new(LogicalInput::B, None, Some(10))]);
        assert_eq!(
            session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::B),
            0
        );
    }

    #[test]
    fn test_button_count_capped() {
        let pressed = Rc::new(RefCell::new(vec![vec![false; 512]]));
        let mut session = session_with_pad(512, pressed, Rc::new(Cell::new(0)));
        let binds = table(vec![]);
        session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::A);

        let pads = session.pads.as_ref().unwrap();
        assert_eq!(pads[0].count, MAX_JOYPAD_BUTTONS);
    }

    #[test]
    fn test_enumeration_happens_once() {
        let enumerations = Rc::new(Cell::new(0));
        let pressed = Rc::new(RefCell::new(vec![vec![false; 16]]));
        let mut session = session_with_pad(16, pressed, enumerations.clone());

        let binds = table(vec![]);
        for _ in 0..5 {
            session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::A);
        }
        assert_eq!(enumerations.get(), 1);
    }

    #[test]
    fn test_fast_forward_side_effect() {
        let pressed = Rc::new(RefCell::new(vec![vec![false; 16]]));
        let mut session = session_with_pad(16, pressed, Rc::new(Cell::new(0)));

        let binds = table(vec![
            InputBinding::new(LogicalInput::FastForward, Some(KeyCode::Tab), None),
            InputBinding::new(LogicalInput::A, Some(KeyCode::KeyZ), None),
        ]);

        assert!(!session.fast_forward());

        session.key_event(KeyCode::Tab, true);
        // Any joypad query refreshes the toggle
        session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::A);
        assert!(session.fast_forward());

        session.key_event(KeyCode::Tab, false);
        session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::A);
        assert!(!session.fast_forward());
    }

    #[test]
    fn test_first_matching_binding_wins() {
        let pressed = Rc::new(RefCell::new(vec![vec![false; 16]]));
        let mut session = session_with_pad(16, pressed, Rc::new(Cell::new(0)));

        // Two bindings for A: only the second one's key is held
        let binds = table(vec![
            InputBinding::new(LogicalInput::A, Some(KeyCode::KeyZ), None),
            InputBinding::new(LogicalInput::A, Some(KeyCode::KeyC), None),
        ]);
        session.key_event(KeyCode::KeyC, true);

        assert_eq!(
            session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::A),
            0
        );
    }

    #[test]
    fn test_unbound_port_reads_zero() {
        let pressed = Rc::new(RefCell::new(vec![vec![true; 16]]));
        let mut session = session_with_pad(16, pressed, Rc::new(Cell::new(0)));
        let binds = table(vec![InputBinding::new(LogicalInput::A, None, Some(0))]);

        assert_eq!(
            session.state(&binds, 7, DeviceClass::Joypad, 0, LogicalInput::A),
            0
        );
    }

    #[test]
    fn test_null_session_reads_zero() {
        let mut session = NullInputSession;
        let binds = BindingTable::default();
        assert_eq!(
            session.state(&binds, 0, DeviceClass::Joypad, 0, LogicalInput::Start),
            0
        );
        assert!(!session.fast_forward());
    }

    #[test]
    fn test_default_binding_table_shape() {
        let table = BindingTable::default();
        assert_eq!(table.ports(), 2);
        assert!(!table.port(0).is_empty());
        assert!(table.port(5).is_empty());
        // Fast forward is bound on the first port
        assert!(table
            .port(0)
            .iter()
            .any(|b| b.id == LogicalInput::FastForward));
    }

    struct MockInputDriver {
        inits: Rc<Cell<u32>>,
    }

    impl InputDriver for MockInputDriver {
        fn ident(&self) -> &'static str {
            "mock"
        }

        fn init(&self) -> InputResult<Box<dyn InputSession>> {
            self.inits.set(self.inits.get() + 1);
            Ok(Box::new(NullInputSession))
        }
    }

    #[test]
    fn test_input_system_init_once_guard() {
        let inits = Rc::new(Cell::new(0));
        let registry = InputRegistry::new(
            "input",
            vec![Box::new(MockInputDriver {
                inits: inits.clone(),
            }) as Box<dyn InputDriver>],
        )
        .unwrap();
        let settings = InputSettings {
            driver: "mock".to_string(),
            bindings: BindingTable::default(),
        };
        let mut sys = InputSystem::new(registry, settings);

        assert_eq!(sys.state(0, DeviceClass::Joypad, 0, LogicalInput::A), 0);

        sys.init_once();
        sys.init_once();
        assert_eq!(inits.get(), 1);
        assert!(sys.is_active());

        sys.free();
        sys.free();
        assert!(!sys.is_active());
    }
}
