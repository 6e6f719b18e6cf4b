pub mod advertisement;
pub mod bluetooth_address;
pub mod central;
pub mod characteristic;
pub mod device;
pub mod error;
pub mod gatt_client_cb;
pub mod gatt_link;
pub mod gatt_status;
pub mod manager;
pub mod mtu;
mod operation;
mod operation_queue;
pub mod scan_result;
pub mod service;
pub mod uuid;

pub use operation::OPERATION_TIMEOUT;

pub mod prelude {
  pub use crate::advertisement::*;
  pub use crate::bluetooth_address::*;
  pub use crate::central::*;
  pub use crate::characteristic::*;
  pub use crate::device::*;
  pub use crate::error::*;
  pub use crate::gatt_client_cb::*;
  pub use crate::gatt_link::*;
  pub use crate::gatt_status::*;
  pub use crate::manager::*;
  pub use crate::mtu::*;
  pub use crate::scan_result::*;
  pub use crate::service::*;
  pub use crate::uuid::*;
  pub use crate::OPERATION_TIMEOUT;
}
