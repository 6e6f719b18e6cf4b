use std::sync::Weak;

use crate::central::Central;
use crate::characteristic::Characteristic;
use crate::gatt_client_cb::DiscoveredService;
use crate::operation_queue::OperationQueue;
use crate::uuid::UUID;

/// One discovered GATT service and its characteristics.  The whole service list is rebuilt
/// from scratch on every discovery pass and emptied on disconnect; holders of a stale service
/// keep a harmless snapshot whose characteristics fail fast.
pub struct Service<C: Central> {
  uuid: UUID,
  characteristics: Vec<Characteristic<C>>,
}

impl<C: Central> Clone for Service<C> {
  fn clone(&self) -> Self {
    Self {
      uuid: self.uuid,
      characteristics: self.characteristics.clone(),
    }
  }
}

impl<C: Central> core::fmt::Debug for Service<C> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Service")
      .field("uuid", &self.uuid)
      .field("characteristics", &self.characteristics)
      .finish()
  }
}

impl<C: Central> Service<C> {
  pub(crate) fn new(discovered: &DiscoveredService, queue: Weak<OperationQueue<C>>) -> Self {
    Self {
      uuid: discovered.uuid,
      characteristics: discovered
        .characteristics
        .iter()
        .map(|c| Characteristic::new(c, queue.clone()))
        .collect(),
    }
  }

  pub fn uuid(&self) -> UUID {
    self.uuid
  }

  pub fn characteristics(&self) -> &[Characteristic<C>] {
    &self.characteristics
  }

  pub fn characteristic(&self, uuid: &UUID) -> Option<&Characteristic<C>> {
    self.characteristics.iter().find(|c| c.uuid() == *uuid)
  }
}
