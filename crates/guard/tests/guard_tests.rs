//! Integration tests for the network guard
//!
//! Drives the guard end-to-end with a recording mock control: attach/detach
//! sequences, duplicate devices, passphrase override, and control failures.

use guard::{AllowList, ControlError, DeviceIdentity, GuardState, NetworkControl, NetworkGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Records every control invocation; optionally fails the next call
#[derive(Clone, Default)]
struct MockControl {
    disable_calls: Arc<AtomicUsize>,
    enable_calls: Arc<AtomicUsize>,
    fail_disable: Arc<AtomicBool>,
    fail_enable: Arc<AtomicBool>,
}

impl MockControl {
    fn disable_calls(&self) -> usize {
        self.disable_calls.load(Ordering::SeqCst)
    }

    fn enable_calls(&self) -> usize {
        self.enable_calls.load(Ordering::SeqCst)
    }
}

impl NetworkControl for MockControl {
    async fn disable(&self) -> Result<(), ControlError> {
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_disable.load(Ordering::SeqCst) {
            return Err(ControlError::Other("injected disable failure".into()));
        }
        Ok(())
    }

    async fn enable(&self) -> Result<(), ControlError> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(ControlError::Other("injected enable failure".into()));
        }
        Ok(())
    }
}

/// Control whose calls park on a semaphore until the test releases them,
/// so events can be injected while a transition is mid-flight
#[derive(Clone)]
struct GatedControl {
    inner: MockControl,
    disable_gate: Arc<Semaphore>,
    enable_gate: Arc<Semaphore>,
    disable_started: Arc<AtomicUsize>,
    enable_started: Arc<AtomicUsize>,
}

impl GatedControl {
    fn new(disable_permits: usize, enable_permits: usize) -> Self {
        Self {
            inner: MockControl::default(),
            disable_gate: Arc::new(Semaphore::new(disable_permits)),
            enable_gate: Arc::new(Semaphore::new(enable_permits)),
            disable_started: Arc::new(AtomicUsize::new(0)),
            enable_started: Arc::new(AtomicUsize::new(0)),
        }
    }

    async fn wait_disable_started(&self) {
        while self.disable_started.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_enable_started(&self) {
        while self.enable_started.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    }
}

impl NetworkControl for GatedControl {
    async fn disable(&self) -> Result<(), ControlError> {
        self.disable_started.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .disable_gate
            .acquire()
            .await
            .map_err(|e| ControlError::Other(e.to_string()))?;
        self.inner.disable().await
    }

    async fn enable(&self) -> Result<(), ControlError> {
        self.enable_started.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .enable_gate
            .acquire()
            .await
            .map_err(|e| ControlError::Other(e.to_string()))?;
        self.inner.enable().await
    }
}

fn dev(vid: u16, pid: u16) -> DeviceIdentity {
    DeviceIdentity::new(vid, pid)
}

fn make_guard(passphrase: &str) -> (NetworkGuard<MockControl>, MockControl) {
    let control = MockControl::default();
    let allow_list = AllowList::new(vec![dev(0x0781, 0x5571)]);
    let guard = NetworkGuard::new(allow_list, passphrase, control.clone());
    (guard, control)
}

#[tokio::test]
async fn test_allowed_device_leaves_network_untouched() {
    let (guard, control) = make_guard("qwerty");

    guard.on_attach(dev(0x0781, 0x5571)).await.unwrap();

    assert_eq!(guard.state().await, GuardState::Enabled);
    assert_eq!(guard.unauthorized().await, 0);
    assert_eq!(control.disable_calls(), 0);
    assert_eq!(control.enable_calls(), 0);
}

#[tokio::test]
async fn test_unauthorized_device_disables_then_detach_enables() {
    let (guard, control) = make_guard("qwerty");

    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();
    assert_eq!(guard.state().await, GuardState::Disabled);
    assert_eq!(guard.unauthorized().await, 1);
    assert_eq!(control.disable_calls(), 1);

    let removed = guard.on_detach(&dev(0x1111, 0x2222)).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(guard.state().await, GuardState::Enabled);
    assert_eq!(guard.unauthorized().await, 0);
    assert_eq!(control.enable_calls(), 1);
}

#[tokio::test]
async fn test_second_unauthorized_device_does_not_reinvoke_disable() {
    let (guard, control) = make_guard("qwerty");

    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();
    guard.on_attach(dev(0x3333, 0x4444)).await.unwrap();

    assert_eq!(guard.state().await, GuardState::Disabled);
    assert_eq!(guard.unauthorized().await, 2);
    // Exactly one disable for the Enabled -> Disabled transition.
    assert_eq!(control.disable_calls(), 1);
}

#[tokio::test]
async fn test_network_stays_down_while_one_unauthorized_remains() {
    let (guard, control) = make_guard("qwerty");

    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();
    guard.on_attach(dev(0x3333, 0x4444)).await.unwrap();

    guard.on_detach(&dev(0x1111, 0x2222)).await.unwrap();
    assert_eq!(guard.state().await, GuardState::Disabled);
    assert_eq!(control.enable_calls(), 0);

    guard.on_detach(&dev(0x3333, 0x4444)).await.unwrap();
    assert_eq!(guard.state().await, GuardState::Enabled);
    assert_eq!(control.enable_calls(), 1);
}

#[tokio::test]
async fn test_duplicate_attach_single_detach_removes_all() {
    let (guard, control) = make_guard("qwerty");

    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();
    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();
    assert_eq!(guard.connected().await, 2);

    let removed = guard.on_detach(&dev(0x1111, 0x2222)).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(guard.connected().await, 0);
    assert_eq!(guard.state().await, GuardState::Enabled);
    assert_eq!(control.enable_calls(), 1);
}

#[tokio::test]
async fn test_detach_of_unknown_device_is_noop() {
    let (guard, control) = make_guard("qwerty");

    let removed = guard.on_detach(&dev(0x9999, 0x9999)).await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(guard.state().await, GuardState::Enabled);
    assert_eq!(control.enable_calls(), 0);
    assert_eq!(control.disable_calls(), 0);
}

#[tokio::test]
async fn test_passphrase_forces_enable_while_device_still_present() {
    let (guard, control) = make_guard("abc");

    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();
    assert_eq!(guard.state().await, GuardState::Disabled);

    for c in "abc".chars() {
        guard.on_key(c).await.unwrap();
    }

    // Forced enable, even though the unauthorized device never left.
    assert_eq!(guard.state().await, GuardState::Enabled);
    assert_eq!(guard.unauthorized().await, 1);
    assert_eq!(control.enable_calls(), 1);
}

#[tokio::test]
async fn test_keystrokes_ignored_while_enabled() {
    let (guard, control) = make_guard("abc");

    // Typing the full passphrase while Enabled must not build up a prefix.
    for c in "ab".chars() {
        guard.on_key(c).await.unwrap();
    }

    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();
    assert_eq!(guard.state().await, GuardState::Disabled);

    // Only 'c' after the lock; without the pre-lock prefix it must not match.
    guard.on_key('c').await.unwrap();
    assert_eq!(guard.state().await, GuardState::Disabled);
    assert_eq!(control.enable_calls(), 0);
}

#[tokio::test]
async fn test_empty_passphrase_never_enables() {
    let (guard, control) = make_guard("");

    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();
    for c in "anything at all ~!".chars() {
        guard.on_key(c).await.unwrap();
    }

    assert_eq!(guard.state().await, GuardState::Disabled);
    assert_eq!(control.enable_calls(), 0);
}

#[tokio::test]
async fn test_disable_failure_keeps_state_and_retries_on_next_attach() {
    let (guard, control) = make_guard("qwerty");
    control.fail_disable.store(true, Ordering::SeqCst);

    let result = guard.on_attach(dev(0x1111, 0x2222)).await;
    assert!(result.is_err());
    assert_eq!(guard.state().await, GuardState::Enabled);
    assert_eq!(control.disable_calls(), 1);
    // The failed attach still tracked the device.
    assert_eq!(guard.connected().await, 1);

    // Next event retries the transition.
    control.fail_disable.store(false, Ordering::SeqCst);
    guard.on_attach(dev(0x3333, 0x4444)).await.unwrap();
    assert_eq!(guard.state().await, GuardState::Disabled);
    assert_eq!(control.disable_calls(), 2);
}

#[tokio::test]
async fn test_enable_failure_keeps_network_down() {
    let (guard, control) = make_guard("abc");

    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();
    control.fail_enable.store(true, Ordering::SeqCst);

    let result = guard.on_detach(&dev(0x1111, 0x2222)).await;
    assert!(result.is_err());
    assert_eq!(guard.state().await, GuardState::Disabled);

    // The passphrase can retry the transition.
    control.fail_enable.store(false, Ordering::SeqCst);
    for c in "abc".chars() {
        guard.on_key(c).await.unwrap();
    }
    assert_eq!(guard.state().await, GuardState::Enabled);
    assert_eq!(control.enable_calls(), 2);
}

#[tokio::test]
async fn test_attach_during_enable_in_flight_reinstates_disable() {
    let control = GatedControl::new(8, 0);
    let allow_list = AllowList::new(vec![dev(0x0781, 0x5571)]);
    let guard = Arc::new(NetworkGuard::new(allow_list, "abc", control.clone()));

    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();
    assert_eq!(guard.state().await, GuardState::Disabled);

    // The final keystroke starts an enable that parks on the gate.
    guard.on_key('a').await.unwrap();
    guard.on_key('b').await.unwrap();
    let typer = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.on_key('c').await })
    };
    control.wait_enable_started().await;

    // A second rogue device arrives while the enable is mid-flight.
    guard.on_attach(dev(0x3333, 0x4444)).await.unwrap();

    control.enable_gate.add_permits(1);
    typer.await.unwrap().unwrap();

    // The landed enable is compensated by a disable for the new device.
    assert_eq!(guard.state().await, GuardState::Disabled);
    assert_eq!(guard.unauthorized().await, 2);
    assert_eq!(control.inner.enable_calls(), 1);
    assert_eq!(control.inner.disable_calls(), 2);
}

#[tokio::test]
async fn test_detach_during_disable_in_flight_restores_network() {
    let control = GatedControl::new(0, 8);
    let allow_list = AllowList::new(vec![dev(0x0781, 0x5571)]);
    let guard = Arc::new(NetworkGuard::new(allow_list, "qwerty", control.clone()));

    // The attach starts a disable that parks on the gate.
    let attacher = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.on_attach(dev(0x1111, 0x2222)).await })
    };
    control.wait_disable_started().await;

    // The device leaves again while the disable is mid-flight.
    let removed = guard.on_detach(&dev(0x1111, 0x2222)).await.unwrap();
    assert_eq!(removed, 1);

    control.disable_gate.add_permits(1);
    attacher.await.unwrap().unwrap();

    // With no devices left the landed disable is compensated by an enable.
    assert_eq!(guard.state().await, GuardState::Enabled);
    assert_eq!(guard.connected().await, 0);
    assert_eq!(control.inner.disable_calls(), 1);
    assert_eq!(control.inner.enable_calls(), 1);
}

#[tokio::test]
async fn test_match_during_enable_in_flight_starts_no_second_enable() {
    let control = GatedControl::new(8, 0);
    let allow_list = AllowList::new(vec![dev(0x0781, 0x5571)]);
    let guard = Arc::new(NetworkGuard::new(allow_list, "abc", control.clone()));

    guard.on_attach(dev(0x1111, 0x2222)).await.unwrap();

    // The detach starts an enable that parks on the gate.
    let detacher = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.on_detach(&dev(0x1111, 0x2222)).await })
    };
    control.wait_enable_started().await;

    // A full passphrase typed mid-flight is consumed without another enable.
    for c in "abc".chars() {
        guard.on_key(c).await.unwrap();
    }

    control.enable_gate.add_permits(1);
    detacher.await.unwrap().unwrap();

    assert_eq!(guard.state().await, GuardState::Enabled);
    assert_eq!(control.inner.enable_calls(), 1);
}

#[tokio::test]
async fn test_serial_aware_allow_list() {
    let control = MockControl::default();
    let allow_list = AllowList::new(vec![
        DeviceIdentity::new(0x0781, 0x5571).with_serial("TRUSTED"),
    ]);
    let guard = NetworkGuard::new(allow_list, "qwerty", control.clone());

    // Same model, wrong unit: unauthorized.
    guard
        .on_attach(dev(0x0781, 0x5571).with_serial("ROGUE"))
        .await
        .unwrap();
    assert_eq!(guard.unauthorized().await, 1);
    assert_eq!(guard.state().await, GuardState::Disabled);
}
