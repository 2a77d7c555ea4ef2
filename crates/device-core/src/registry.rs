//! Device registry
//!
//! Owns the shared [`DeviceContext`] and hands out at most one device
//! object per Bluetooth device id.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::a2dp::BtA2dp;
use crate::device::{BluetoothDevice, DeviceContext};
use crate::error::{DeviceError, Result};
use crate::sco::BtSco;
use crate::types::{BtProfile, DeviceId};

#[derive(Debug)]
pub struct DeviceRegistry {
    ctx: Arc<DeviceContext>,
    a2dp: DashMap<DeviceId, Arc<BtA2dp>>,
    sco: DashMap<DeviceId, Arc<BtSco>>,
}

impl DeviceRegistry {
    pub fn new(ctx: DeviceContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            a2dp: DashMap::new(),
            sco: DashMap::new(),
        }
    }

    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    /// A2DP device for `id`, created on first request
    pub fn a2dp(&self, id: DeviceId) -> Result<Arc<BtA2dp>> {
        if id.profile() != BtProfile::A2dp {
            return Err(DeviceError::invalid_param(format!("{} is not an A2DP device", id)));
        }
        // Construction opens the stack source, so it runs at most once per id
        let device = self
            .a2dp
            .entry(id)
            .or_try_insert_with(|| {
                info!(device = %id, "Creating A2DP device instance");
                BtA2dp::new(id, Arc::clone(&self.ctx)).map(Arc::new)
            })?
            .clone();
        Ok(device)
    }

    /// SCO device for `id`, created on first request
    pub fn sco(&self, id: DeviceId) -> Result<Arc<BtSco>> {
        if id.profile() != BtProfile::Sco {
            return Err(DeviceError::invalid_param(format!("{} is not a SCO device", id)));
        }
        let device = self
            .sco
            .entry(id)
            .or_try_insert_with(|| {
                info!(device = %id, "Creating SCO device instance");
                BtSco::new(id, Arc::clone(&self.ctx)).map(Arc::new)
            })?
            .clone();
        Ok(device)
    }

    /// Device for any Bluetooth id
    pub fn device(&self, id: DeviceId) -> Result<Arc<dyn BluetoothDevice>> {
        match id.profile() {
            BtProfile::A2dp => Ok(self.a2dp(id)?),
            BtProfile::Sco => Ok(self.sco(id)?),
        }
    }
}
