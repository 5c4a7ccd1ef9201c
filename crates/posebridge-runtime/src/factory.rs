//! Container construction and host-side handles

use std::sync::atomic::{AtomicU64, Ordering};

use posebridge_core::{BridgeError, BridgeResult, ContainerId};
use tracing::debug;

use crate::ui::UiHandle;

/// Builds containers for the host tree
#[derive(Debug)]
pub struct ContainerViewFactory {
    ui: UiHandle,
    created: AtomicU64,
}

impl ContainerViewFactory {
    pub fn new(ui: UiHandle) -> Self {
        ContainerViewFactory {
            ui,
            created: AtomicU64::new(0),
        }
    }

    /// Construct the container the host will insert under `tag`.
    ///
    /// The container starts unattached with unknown size; nothing is
    /// created until the host attaches it.
    pub fn create_view(&self, tag: ContainerId) -> BridgeResult<ContainerHandle> {
        if !tag.is_valid() {
            return Err(BridgeError::malformed(
                "tag",
                format!("{} is not a host view tag", tag.0),
            ));
        }
        self.ui.register(tag)?;
        self.created.fetch_add(1, Ordering::Relaxed);
        debug!(container = %tag, "view created");

        Ok(ContainerHandle {
            id: tag,
            ui: self.ui.clone(),
        })
    }

    /// Containers handed out so far
    pub fn views_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

/// The host's handle on one container
///
/// Attach and detach notifications are posted to the UI thread in the order
/// the host issues them.
#[derive(Clone, Debug)]
pub struct ContainerHandle {
    id: ContainerId,
    ui: UiHandle,
}

impl ContainerHandle {
    #[inline]
    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn attach(&self) -> BridgeResult<()> {
        self.ui.attach(self.id)
    }

    pub fn detach(&self) -> BridgeResult<()> {
        self.ui.detach(self.id)
    }

    /// Host dropped the view: tear down and forget the container
    pub fn dispose(self) -> BridgeResult<()> {
        self.ui.dispose(self.id)
    }

    /// Target width pushed by the control channel
    pub fn set_width(&self, width: u32) -> BridgeResult<()> {
        positive(width, "width")?;
        self.ui.set_width(self.id, width)
    }

    pub fn set_height(&self, height: u32) -> BridgeResult<()> {
        positive(height, "height")?;
        self.ui.set_height(self.id, height)
    }
}

fn positive(value: u32, key: &str) -> BridgeResult<()> {
    if value == 0 {
        Err(BridgeError::malformed(key, "must be positive"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::UiMessage;

    #[test]
    fn test_create_view_registers_container() {
        let (ui, mut rx) = UiHandle::detached();
        let factory = ContainerViewFactory::new(ui);

        let view = factory.create_view(ContainerId::new(5)).unwrap();
        view.attach().unwrap();
        view.set_width(480).unwrap();
        view.detach().unwrap();
        view.dispose().unwrap();

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|m| m.name())
            .collect();
        assert_eq!(names, vec!["register", "attach", "set_width", "detach", "dispose"]);
        assert_eq!(factory.views_created(), 1);
    }

    #[test]
    fn test_invalid_tag_rejected() {
        let (ui, mut rx) = UiHandle::detached();
        let factory = ContainerViewFactory::new(ui);

        assert!(factory.create_view(ContainerId::NONE).is_err());
        assert!(rx.try_recv().is_err());
        assert_eq!(factory.views_created(), 0);
    }

    #[test]
    fn test_zero_size_rejected() {
        let (ui, mut rx) = UiHandle::detached();
        let view = ContainerViewFactory::new(ui)
            .create_view(ContainerId::new(5))
            .unwrap();
        assert!(view.set_height(0).is_err());

        assert!(matches!(rx.try_recv(), Ok(UiMessage::Register(_))));
        assert!(rx.try_recv().is_err());
    }
}
