use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::bluetooth_address::BluetoothAddress;
use crate::central::Central;
use crate::characteristic::CharacteristicProperty;
use crate::error::Error;
use crate::gatt_client_cb::{ConnectionState, GattCallback, GattEvent};
use crate::gatt_link::GattLink;
use crate::operation::{
  Operation, OperationOutcome, OperationRequest, OperationResult, DISABLE_NOTIFICATION_VALUE,
  ENABLE_INDICATION_VALUE, ENABLE_NOTIFICATION_VALUE,
};
use crate::uuid::UUID;

/// Serializes GATT requests for one device.  The platform accepts a single outstanding
/// request per connection, so every caller-facing call funnels through here: requests queue in
/// FIFO order, exactly one is dispatched at a time, and the platform's asynchronous callbacks
/// are demultiplexed back onto whichever request is current.
///
/// Locking: the pending list, the current slot and the link handle live behind one mutex.
/// Appending-and-dispatching and resolving-and-advancing are mutually exclusive through it,
/// while actual platform calls and completion wakeups happen outside it so a stack that calls
/// back re-entrantly cannot deadlock against us.
pub(crate) struct OperationQueue<C: Central> {
  backend: Arc<C>,
  address: BluetoothAddress,
  runtime: Handle,
  /// Event sink handed to the platform when dispatching a connect.  Held weakly: the session
  /// owns us, not the other way around.
  sink: Mutex<Option<Weak<dyn GattCallback<C::Connection>>>>,
  inner: Mutex<Inner<C>>,
}

struct Inner<C: Central> {
  pending: VecDeque<Operation>,
  current: Option<Dispatched>,
  /// Live connection handle; present exactly between a connected event and the following
  /// disconnected event.
  link: Option<C::Connection>,
  next_seq: u64,
}

struct Dispatched {
  operation: Operation,
  timer: Option<JoinHandle<()>>,
}

/// What `initiate` decided: either the platform call is in flight and a callback will follow,
/// or the operation's fate was settled synchronously.
enum Initiation {
  InFlight,
  SettledNow(OperationResult),
}

impl<C: Central> OperationQueue<C> {
  pub(crate) fn new(backend: Arc<C>, address: BluetoothAddress, runtime: Handle) -> Arc<Self> {
    Arc::new(Self {
      backend,
      address,
      runtime,
      sink: Mutex::new(None),
      inner: Mutex::new(Inner {
        pending: VecDeque::new(),
        current: None,
        link: None,
        next_seq: 0,
      }),
    })
  }

  pub(crate) fn set_sink(&self, sink: Weak<dyn GattCallback<C::Connection>>) {
    *self.sink.lock().unwrap() = Some(sink);
  }

  /// Append a request and kick dispatch.  The returned channel resolves exactly once with the
  /// operation's result; the caller suspends on it for as long as the queue needs.
  pub(crate) fn enqueue(self: &Arc<Self>, request: OperationRequest) -> oneshot::Receiver<OperationResult> {
    let (tx, rx) = oneshot::channel();
    {
      let mut inner = self.inner.lock().unwrap();
      let seq = inner.next_seq;
      inner.next_seq += 1;
      trace!(device = %self.address, seq, ?request, "operation enqueued");
      inner.pending.push_back(Operation::new(seq, request, tx));
    }
    self.pump();
    rx
  }

  /// Dispatch the head of the pending list whenever no operation is current.  Loops so that
  /// operations which settle synchronously (no live link, platform rejection) immediately make
  /// way for the next one instead of wedging the queue.
  pub(crate) fn pump(self: &Arc<Self>) {
    loop {
      let (seq, request, link) = {
        let mut inner = self.inner.lock().unwrap();
        if inner.current.is_some() {
          return;
        }
        let Some(operation) = inner.pending.pop_front() else {
          return;
        };
        let seq = operation.seq;
        let request = operation.request.clone();
        let link = inner.link.clone();
        let timer = self.arm_timeout(seq, operation.timeout);
        inner.current = Some(Dispatched {
          operation,
          timer: Some(timer),
        });
        (seq, request, link)
      };

      trace!(device = %self.address, seq, "operation dispatched");
      match self.initiate(&request, link) {
        Initiation::InFlight => return,
        Initiation::SettledNow(result) => self.finish(seq, result),
      }
    }
  }

  /// Forward a platform event to the current operation and track the link handle.  The
  /// operation decides for itself whether the event resolves it; an event nobody claims is
  /// simply dropped here (the session layer has already routed it to characteristics).
  pub(crate) fn route_event(self: &Arc<Self>, event: &GattEvent<C::Connection>) {
    let resolution = {
      let mut inner = self.inner.lock().unwrap();

      if let GattEvent::ConnectionStateChanged { state, link, .. } = event {
        match state {
          ConnectionState::Connected => inner.link = link.clone(),
          ConnectionState::Disconnected => inner.link = None,
          ConnectionState::Connecting => {}
        }
      }

      match &inner.current {
        Some(dispatched) if !dispatched.operation.is_complete() => dispatched
          .operation
          .handle_event(event)
          .map(|result| (dispatched.operation.seq, result)),
        _ => None,
      }
    };

    if let Some((seq, result)) = resolution {
      self.finish(seq, result);
    }
  }

  /// Resolve the current operation if it is still the one identified by `seq`, then advance.
  /// The sequence check makes this safe to call from a stale timeout timer: by the time an
  /// expired timer fires, a different operation may already be current.
  fn finish(self: &Arc<Self>, seq: u64, result: OperationResult) {
    let resolved = {
      let mut inner = self.inner.lock().unwrap();
      match inner.current.take() {
        Some(mut dispatched) if dispatched.operation.seq == seq => {
          dispatched.operation.resolve(result);
          if let Some(timer) = dispatched.timer.take() {
            timer.abort();
          }
          true
        }
        // Not ours to resolve; put it back.
        other => {
          inner.current = other;
          false
        }
      }
    };
    if resolved {
      trace!(device = %self.address, seq, "operation resolved");
      self.pump();
    }
  }

  fn arm_timeout(self: &Arc<Self>, seq: u64, timeout: Duration) -> JoinHandle<()> {
    let queue = Arc::downgrade(self);
    self.runtime.spawn(async move {
      tokio::time::sleep(timeout).await;
      if let Some(queue) = queue.upgrade() {
        warn!(device = %queue.address, seq, "operation timed out");
        queue.finish(seq, Err(Error::Cancelled));
      }
    })
  }

  /// Issue the platform call for a freshly dispatched request.  Runs outside the queue lock.
  /// Requests that need a live link settle as [Error::NotConnected] on the spot when there is
  /// none, keeping the queue moving and giving every caller a deterministic answer.
  fn initiate(&self, request: &OperationRequest, link: Option<C::Connection>) -> Initiation {
    match request {
      OperationRequest::Connect => {
        let Some(sink) = self.sink.lock().unwrap().clone().filter(|s| s.strong_count() > 0) else {
          return Initiation::SettledNow(Err(Error::Adapter("device session released".into())));
        };
        into_initiation(self.backend.connect(&self.address, sink))
      }

      OperationRequest::Disconnect => match link {
        // Already down: report success without bothering the platform.
        None => Initiation::SettledNow(Ok(OperationOutcome::Done)),
        Some(link) => into_initiation(link.close()),
      },

      OperationRequest::DiscoverServices => with_link(link, |link| link.discover_services()),

      OperationRequest::RequestMtu { mtu } => with_link(link, |link| link.request_mtu(*mtu)),

      OperationRequest::Read { characteristic } => {
        with_link(link, |link| link.read_characteristic(characteristic))
      }

      OperationRequest::Write {
        characteristic,
        value,
        write_type,
      } => with_link(link, |link| {
        link.write_characteristic(characteristic, value, *write_type)
      }),

      OperationRequest::Subscribe {
        characteristic,
        properties,
      } => {
        let value: &[u8] = if properties.contains(CharacteristicProperty::Notify) {
          &ENABLE_NOTIFICATION_VALUE
        } else {
          &ENABLE_INDICATION_VALUE
        };
        with_link(link, |link| {
          link.enable_notifications(characteristic, true)?;
          link.write_descriptor(characteristic, &UUID::CCCD, value)
        })
      }

      OperationRequest::Unsubscribe { characteristic } => with_link(link, |link| {
        link.enable_notifications(characteristic, false)?;
        link.write_descriptor(characteristic, &UUID::CCCD, &DISABLE_NOTIFICATION_VALUE)
      }),
    }
  }
}

fn with_link<L, F>(link: Option<L>, call: F) -> Initiation
where
  L: GattLink,
  F: FnOnce(&L) -> Result<(), L::SystemError>,
{
  let Some(link) = link else {
    return Initiation::SettledNow(Err(Error::NotConnected));
  };
  into_initiation(call(&link))
}

fn into_initiation<E: core::fmt::Debug>(result: Result<(), E>) -> Initiation {
  match result {
    Ok(()) => Initiation::InFlight,
    Err(e) => Initiation::SettledNow(Err(Error::Adapter(format!("{e:?}")))),
  }
}
