use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::advertisement::AdvertisementData;
use crate::bluetooth_address::BluetoothAddress;
use crate::central::{AdapterState, Authorization, Central, CentralCallback, CentralEvent};
use crate::device::Device;
use crate::error::Error;
use crate::scan_result::ScanResult;
use crate::uuid::UUID;

/// Platform stacks block applications that start scans too eagerly; stay under this budget and
/// surface a typed error instead of tripping the OS-side penalty.
pub const SCAN_BUDGET: usize = 5;
pub const SCAN_WINDOW: Duration = Duration::from_secs(30);

const SCAN_RESULT_CAPACITY: usize = 16;

/// Entry point of the crate: drives scanning on one adapter and hands out [Device] sessions
/// for the peripherals it observes.  Sessions are created on first sight of an address and are
/// never discarded behind the caller's back; dropping the manager (and every session clone)
/// releases everything.
pub struct Manager<C: Central> {
  shared: Arc<ManagerShared<C>>,
}

impl<C: Central> Clone for Manager<C> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

struct ManagerShared<C: Central> {
  backend: Arc<C>,
  runtime: Handle,
  adapter_state: watch::Sender<AdapterState>,
  authorization: watch::Sender<Authorization>,
  scan_enabled: watch::Sender<bool>,
  devices: Mutex<HashMap<BluetoothAddress, Device<C>>>,
  devices_watch: watch::Sender<HashMap<BluetoothAddress, Device<C>>>,
  scan_results: broadcast::Sender<ScanResult<C>>,
  scan_times: Mutex<VecDeque<Instant>>,
}

impl<C: Central> Manager<C> {
  /// Wrap a platform adapter.  Must be called within a Tokio runtime: its handle is captured
  /// so that platform callbacks arriving on foreign threads can still drive timers and
  /// sessions.
  pub fn new(backend: C) -> Result<Self, Error> {
    let backend = Arc::new(backend);
    let shared = Arc::new(ManagerShared {
      adapter_state: watch::Sender::new(backend.adapter_state()),
      authorization: watch::Sender::new(backend.authorization()),
      backend: backend.clone(),
      runtime: Handle::current(),
      scan_enabled: watch::Sender::new(false),
      devices: Mutex::new(HashMap::new()),
      devices_watch: watch::Sender::new(HashMap::new()),
      scan_results: broadcast::Sender::new(SCAN_RESULT_CAPACITY),
      scan_times: Mutex::new(VecDeque::new()),
    });

    let sink_arc: Arc<dyn CentralCallback> = shared.clone();
    let sink: Weak<dyn CentralCallback> = Arc::downgrade(&sink_arc);
    backend
      .configure(sink)
      .map_err(|e| Error::Adapter(format!("{e:?}")))?;

    Ok(Self { shared })
  }

  pub fn adapter_state(&self) -> watch::Receiver<AdapterState> {
    self.shared.adapter_state.subscribe()
  }

  pub fn authorization(&self) -> watch::Receiver<Authorization> {
    self.shared.authorization.subscribe()
  }

  /// Ask the OS for the Bluetooth permissions this crate needs; progress shows up on
  /// [Manager::authorization].
  pub fn authorization_request(&self) -> Result<(), Error> {
    self
      .shared
      .backend
      .authorization_request()
      .map_err(|e| Error::Adapter(format!("{e:?}")))
  }

  pub fn scan_enabled(&self) -> watch::Receiver<bool> {
    self.shared.scan_enabled.subscribe()
  }

  /// Every session this manager knows about, keyed by address.
  pub fn devices(&self) -> watch::Receiver<HashMap<BluetoothAddress, Device<C>>> {
    self.shared.devices_watch.subscribe()
  }

  /// Subscribe to decoded scan results.  Slow consumers lag rather than block scanning.
  pub fn scan_results(&self) -> broadcast::Receiver<ScanResult<C>> {
    self.shared.scan_results.subscribe()
  }

  /// The session for `address`, created on first use.  Works for addresses never seen in a
  /// scan, e.g. remembered from an earlier run.
  pub fn device(&self, address: BluetoothAddress) -> Device<C> {
    self.shared.device(address)
  }

  /// Start scanning, optionally filtered to peripherals advertising one of `service_filter`.
  /// A no-op when already scanning.  Fails with [Error::ScanThrottled] when starts exceed the
  /// platform budget of [SCAN_BUDGET] per [SCAN_WINDOW].
  pub fn scan_start(&self, service_filter: &[UUID]) -> Result<(), Error> {
    if *self.shared.scan_enabled.borrow() {
      return Ok(());
    }

    self.shared.scan_budget_check()?;

    self
      .shared
      .backend
      .scan_start(service_filter)
      .map_err(|e| Error::Adapter(format!("{e:?}")))?;
    self.shared.scan_enabled.send_replace(true);
    debug!("scan started");
    Ok(())
  }

  pub fn scan_stop(&self) -> Result<(), Error> {
    if !*self.shared.scan_enabled.borrow() {
      return Ok(());
    }

    self
      .shared
      .backend
      .scan_stop()
      .map_err(|e| Error::Adapter(format!("{e:?}")))?;
    self.shared.scan_enabled.send_replace(false);
    debug!("scan stopped");
    Ok(())
  }
}

impl<C: Central> ManagerShared<C> {
  fn device(&self, address: BluetoothAddress) -> Device<C> {
    let mut devices = self.devices.lock().unwrap();
    if let Some(device) = devices.get(&address) {
      return device.clone();
    }

    let device = Device::with_runtime(self.backend.clone(), address, self.runtime.clone());
    devices.insert(address, device.clone());
    self.devices_watch.send_replace(devices.clone());
    device
  }

  /// Enforce the rolling scan-start budget.  Keeps one timestamp per allowed start; the
  /// oldest one determines how long a throttled caller has to wait.
  fn scan_budget_check(&self) -> Result<(), Error> {
    let mut times = self.scan_times.lock().unwrap();
    let now = Instant::now();

    if times.len() < SCAN_BUDGET {
      times.push_back(now);
      return Ok(());
    }

    let elapsed = now.duration_since(times[0]);
    if elapsed < SCAN_WINDOW {
      return Err(Error::ScanThrottled {
        wait: SCAN_WINDOW - elapsed,
      });
    }

    times.pop_front();
    times.push_back(now);
    Ok(())
  }
}

impl<C: Central> CentralCallback for ManagerShared<C> {
  fn on_event(&self, event: CentralEvent) {
    match event {
      CentralEvent::StateChanged(state) => {
        debug!(?state, "adapter state changed");
        self.adapter_state.send_replace(state);
      }

      CentralEvent::AuthorizationChanged(authorization) => {
        debug!(?authorization, "authorization changed");
        self.authorization.send_replace(authorization);
      }

      CentralEvent::ScanFailed { code } => {
        warn!(code, "scan failed");
        self.scan_enabled.send_replace(false);
      }

      CentralEvent::ScanResult {
        address,
        name,
        rssi,
        data,
        connectable,
      } => {
        let device = self.device(address);
        let advertisement = AdvertisementData::parse(&data);
        device
          .shared()
          .note_scan_result(name, rssi, advertisement.clone(), connectable);

        let advertised_services = advertisement.service_uuids();
        // Nobody listening is fine; scanning still refreshes the device registry.
        let _ = self.scan_results.send(ScanResult {
          device,
          rssi,
          advertisement,
          advertised_services,
          connectable,
        });
      }
    }
  }
}
