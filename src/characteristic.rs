use std::sync::{Arc, Weak};

use enumset::{EnumSet, EnumSetType};
use tokio::sync::watch;

use crate::central::Central;
use crate::error::Error;
use crate::gatt_client_cb::DiscoveredCharacteristic;
use crate::gatt_link::WriteType;
use crate::operation::{OperationOutcome, OperationRequest};
use crate::operation_queue::OperationQueue;
use crate::uuid::UUID;

/// Capabilities a characteristic advertises.  Notify and Indicate are kept distinct because
/// subscribing writes a different CCCD enable value for each.
#[derive(Debug, EnumSetType)]
pub enum CharacteristicProperty {
  Read,
  WriteWithResponse,
  WriteWithoutResponse,
  Notify,
  Indicate,
}

/// Handle to one discovered characteristic.  All request methods funnel through the owning
/// device's operation queue, so concurrent callers are serialized with every other request on
/// that device.
///
/// Instances are created fresh on every service discovery pass and become inert (requests fail
/// with [Error::NotConnected]) once their session is released.  Clones share state.
pub struct Characteristic<C: Central> {
  shared: Arc<Shared<C>>,
}

struct Shared<C: Central> {
  uuid: UUID,
  properties: EnumSet<CharacteristicProperty>,
  queue: Weak<OperationQueue<C>>,
  value: watch::Sender<Vec<u8>>,
  is_notifying: watch::Sender<bool>,
}

impl<C: Central> Clone for Characteristic<C> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<C: Central> core::fmt::Debug for Characteristic<C> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Characteristic")
      .field("uuid", &self.shared.uuid)
      .field("properties", &self.shared.properties)
      .finish()
  }
}

impl<C: Central> Characteristic<C> {
  pub(crate) fn new(discovered: &DiscoveredCharacteristic, queue: Weak<OperationQueue<C>>) -> Self {
    Self {
      shared: Arc::new(Shared {
        uuid: discovered.uuid,
        properties: discovered.properties,
        queue,
        value: watch::Sender::new(Vec::new()),
        is_notifying: watch::Sender::new(false),
      }),
    }
  }

  pub fn uuid(&self) -> UUID {
    self.shared.uuid
  }

  pub fn properties(&self) -> EnumSet<CharacteristicProperty> {
    self.shared.properties
  }

  /// Latest observed value: the most recent read result or notification payload.  Cleared on
  /// disconnect.
  pub fn value(&self) -> watch::Receiver<Vec<u8>> {
    self.shared.value.subscribe()
  }

  pub fn latest_value(&self) -> Vec<u8> {
    self.shared.value.borrow().clone()
  }

  /// Whether notification delivery is currently enabled for this characteristic.
  pub fn is_notifying(&self) -> watch::Receiver<bool> {
    self.shared.is_notifying.subscribe()
  }

  /// Read the characteristic's value from the peer.
  pub async fn read(&self) -> Result<Vec<u8>, Error> {
    self
      .enqueue(OperationRequest::Read {
        characteristic: self.shared.uuid,
      })
      .await?
      .expect_value()
  }

  /// Write a value, acknowledged by the peer or not depending on `with_response`.
  pub async fn write(&self, value: &[u8], with_response: bool) -> Result<(), Error> {
    let write_type = if with_response {
      WriteType::WithResponse
    } else {
      WriteType::WithoutResponse
    };
    self
      .enqueue(OperationRequest::Write {
        characteristic: self.shared.uuid,
        value: value.to_vec(),
        write_type,
      })
      .await?;
    Ok(())
  }

  /// Enable notification (or indication, when that is all the characteristic supports)
  /// delivery.  Subsequent pushes from the peer land in [Characteristic::value].
  pub async fn subscribe(&self) -> Result<(), Error> {
    self
      .enqueue(OperationRequest::Subscribe {
        characteristic: self.shared.uuid,
        properties: self.shared.properties,
      })
      .await?;
    self.shared.is_notifying.send_replace(true);
    Ok(())
  }

  pub async fn unsubscribe(&self) -> Result<(), Error> {
    self
      .enqueue(OperationRequest::Unsubscribe {
        characteristic: self.shared.uuid,
      })
      .await?;
    self.shared.is_notifying.send_replace(false);
    Ok(())
  }

  async fn enqueue(&self, request: OperationRequest) -> Result<OperationOutcome, Error> {
    let Some(queue) = self.shared.queue.upgrade() else {
      return Err(Error::NotConnected);
    };
    let receiver = queue.enqueue(request);
    receiver.await.unwrap_or(Err(Error::Cancelled))
  }

  /// Record a value observed through a read completion or an unsolicited notification.
  pub(crate) fn update_value(&self, value: Vec<u8>) {
    self.shared.value.send_replace(value);
  }

  /// The link is gone: observed state resets with it.
  pub(crate) fn reset_on_disconnect(&self) {
    self.shared.value.send_replace(Vec::new());
    self.shared.is_notifying.send_replace(false);
  }
}
