use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use super::message::PopupMessage;
use crate::config::PopupSpec;

/// What the hosting environment can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostCapabilities {
    pub popups: bool,
    pub cross_window_messaging: bool,
}

impl HostCapabilities {
    #[must_use]
    pub fn full() -> Self {
        Self {
            popups: true,
            cross_window_messaging: true,
        }
    }
}

/// Registration handle returned by [`HostWindow::add_message_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A cross-window message as delivered by the host, origin included.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    pub origin: String,
    pub data: serde_json::Value,
}

/// A secondary window opened by [`HostWindow::open_popup`].
pub trait PopupWindow: Send {
    fn is_closed(&self) -> bool;
}

/// The window the client runs in.
///
/// Implemented by the embedding (a webview bridge, a wasm shim, a test
/// fake). All calls are synchronous and must not block.
pub trait HostWindow: Send + Sync + 'static {
    type Popup: PopupWindow;

    fn hostname(&self) -> String;

    fn capabilities(&self) -> HostCapabilities;

    /// Opens a named, fixed-size window. `None` when the host blocked it.
    fn open_popup(&self, url: &Url, spec: &PopupSpec) -> Option<Self::Popup>;

    /// Starts forwarding every cross-window message to `sink`.
    fn add_message_listener(&self, sink: UnboundedSender<WindowMessage>) -> ListenerId;

    fn remove_message_listener(&self, id: ListenerId);

    /// Full-window navigation. The current page is expected to unload.
    fn navigate(&self, url: &str);

    /// Sets the location fragment and reloads the current page.
    fn reload_with_fragment(&self, fragment: &str);

    fn current_url(&self) -> Url;

    /// Whether this window was opened by another one.
    fn has_opener(&self) -> bool;

    /// Posts `message` to the opener, delivered only if the opener's origin
    /// is `target_origin`.
    fn post_to_opener(&self, message: &PopupMessage, target_origin: &str);

    /// Closes this window.
    fn close(&self);

    /// Per-origin storage that survives navigation.
    fn store_item(&self, key: &str, value: &str);

    /// Reads and removes a stored item.
    fn take_item(&self, key: &str) -> Option<String>;
}

/// Deregisters a message listener when dropped.
pub(crate) struct ListenerGuard<'a, H: HostWindow> {
    host: &'a H,
    id: ListenerId,
}

impl<'a, H: HostWindow> ListenerGuard<'a, H> {
    pub(crate) fn register(host: &'a H, sink: UnboundedSender<WindowMessage>) -> Self {
        let id = host.add_message_listener(sink);
        tracing::debug!(listener = id.0, "Message listener registered");
        Self { host, id }
    }
}

impl<H: HostWindow> Drop for ListenerGuard<'_, H> {
    fn drop(&mut self) {
        self.host.remove_message_listener(self.id);
        tracing::debug!(listener = self.id.0, "Message listener removed");
    }
}
