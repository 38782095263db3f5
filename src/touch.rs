//! Hardware touch-sensor trigger source
//!
//! Some microscopes carry a touch sensor that reports presses through a
//! vendor library callback, invoked on a thread we do not own. The callback
//! only enqueues a hardware trigger.

use tracing::{info, warn};

use crate::triggers::TriggerSender;

/// Callback invoked by the device on each press
pub(crate) type PressCallback = Box<dyn Fn() + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum TouchError {
    #[error("Touch device unavailable: {0}")]
    Unavailable(String),
}

/// Capability interface of a touch-enabled device
pub(crate) trait TouchDevice: Send {
    fn init(&mut self) -> Result<(), TouchError>;
    fn enable_touch(&mut self, enabled: bool) -> Result<(), TouchError>;
    fn set_press_callback(&mut self, callback: PressCallback) -> Result<(), TouchError>;
}

/// Used when no vendor binding is present; never initialises
#[derive(Debug, Default)]
pub(crate) struct UnavailableTouchDevice;

impl TouchDevice for UnavailableTouchDevice {
    fn init(&mut self) -> Result<(), TouchError> {
        Err(TouchError::Unavailable(
            "no touch-sensor driver is available on this station".to_string(),
        ))
    }

    fn enable_touch(&mut self, _enabled: bool) -> Result<(), TouchError> {
        Err(TouchError::Unavailable("device not initialised".to_string()))
    }

    fn set_press_callback(&mut self, _callback: PressCallback) -> Result<(), TouchError> {
        Err(TouchError::Unavailable("device not initialised".to_string()))
    }
}

/// Wire the device's press callback to the trigger queue.
///
/// Returns whether the hardware source is live. Any failure leaves the source
/// disabled for the rest of the process; other trigger sources are unaffected.
pub(crate) fn attach_touch_trigger(device: &mut dyn TouchDevice, trigger: TriggerSender) -> bool {
    match wire(device, trigger) {
        Ok(()) => {
            info!("Hardware touch trigger enabled");
            true
        }
        Err(e) => {
            warn!("Hardware touch trigger disabled: {}", e);
            false
        }
    }
}

fn wire(device: &mut dyn TouchDevice, trigger: TriggerSender) -> Result<(), TouchError> {
    device.init()?;
    device.set_press_callback(Box::new(move || {
        trigger.fire();
    }))?;
    device.enable_touch(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TriggerSource;
    use crate::triggers::trigger_channel;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeDevice {
        fail_enable: bool,
        enabled: bool,
        callback: Arc<Mutex<Option<PressCallback>>>,
    }

    impl TouchDevice for FakeDevice {
        fn init(&mut self) -> Result<(), TouchError> {
            Ok(())
        }

        fn enable_touch(&mut self, enabled: bool) -> Result<(), TouchError> {
            if self.fail_enable {
                return Err(TouchError::Unavailable("EnableMicroTouch returned false".into()));
            }
            self.enabled = enabled;
            Ok(())
        }

        fn set_press_callback(&mut self, callback: PressCallback) -> Result<(), TouchError> {
            *self.callback.lock().unwrap() = Some(callback);
            Ok(())
        }
    }

    #[test]
    fn test_press_on_device_thread_enqueues_hardware_trigger() {
        let (tx, mut rx) = trigger_channel(4);
        let mut device = FakeDevice::default();
        let callback = Arc::clone(&device.callback);

        assert!(attach_touch_trigger(
            &mut device,
            TriggerSender::new(tx, TriggerSource::Hardware)
        ));
        assert!(device.enabled);

        std::thread::spawn(move || {
            if let Some(press) = callback.lock().unwrap().as_ref() {
                press();
            }
        })
        .join()
        .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.source, TriggerSource::Hardware);
    }

    #[test]
    fn test_unavailable_device_disables_source() {
        let (tx, mut rx) = trigger_channel(4);
        let mut device = UnavailableTouchDevice;
        assert!(!attach_touch_trigger(
            &mut device,
            TriggerSender::new(tx, TriggerSource::Hardware)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_enable_failure_reports_disabled() {
        let (tx, _rx) = trigger_channel(4);
        let mut device = FakeDevice {
            fail_enable: true,
            ..FakeDevice::default()
        };
        assert!(!attach_touch_trigger(
            &mut device,
            TriggerSender::new(tx, TriggerSource::Hardware)
        ));
    }
}
