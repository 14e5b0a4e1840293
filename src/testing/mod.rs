//! Testing utilities for DualPOV
//!
//! Simulated cameras, outputs and permission prompts, so the whole pipeline
//! can run offline without capture hardware.

mod fakes;
mod hardware;
pub mod synthetic_data;

#[cfg(feature = "recording")]
pub use fakes::encoded_deps;
pub use fakes::{
    finalizer_with, finalizer_with_loader, plan_finalizer, simulated_deps, CountingExporter,
    FailingExporter, PlanExporter, RecordingSink,
};
pub use hardware::{
    simulated_device_set, BackendFault, SimulatedAuthorization, SimulatedBackend,
    SimulatedDevices, SimulatedOutput,
};
pub use synthetic_data::{synthetic_video_frame, SimulatedCameraProfile};
