use super::{DisplayConnection, DisplayError, EffectiveRegion, RawImage, WindowGeometry, WindowRef};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

/// Open/closed holder for a shared connection.
///
/// Callers clone the `Arc` out and release the lock before issuing requests,
/// so `close` only empties the slot and never waits on replies still in
/// flight on another thread.
struct Slot<C>(RwLock<Option<Arc<C>>>);

impl<C> Slot<C> {
    fn new(conn: C) -> Self {
        Self(RwLock::new(Some(Arc::new(conn))))
    }

    fn get(&self) -> Result<Arc<C>, DisplayError> {
        self.0.read().clone().ok_or(DisplayError::ConnectionClosed)
    }

    /// Returns false if it was already closed.
    fn close(&self) -> bool {
        self.0.write().take().is_some()
    }

    fn is_open(&self) -> bool {
        self.0.read().is_some()
    }
}

/// The process-wide connection to the X server. `RustConnection` is
/// thread-safe, so the capture worker and the control thread share it.
pub struct X11Connection {
    conn: Slot<RustConnection>,
    root: Window,
}

fn request_err(what: &str) -> impl Fn(ConnectionError) -> DisplayError + '_ {
    move |e| DisplayError::Connection(format!("{what} failed: {e}"))
}

/// Protocol errors (BadWindow, BadMatch, ...) are `Request`; a broken
/// connection is `Connection`.
fn reply_err(what: &str) -> impl Fn(ReplyError) -> DisplayError + '_ {
    move |e| match e {
        ReplyError::X11Error(e) => {
            DisplayError::Request(format!("{what} reply failed: Bad{:?}", e.error_kind))
        }
        ReplyError::ConnectionError(e) => {
            DisplayError::Connection(format!("{what} reply failed: {e}"))
        }
    }
}

impl X11Connection {
    /// Connect to the server named by `$DISPLAY`. Not retried.
    pub fn open() -> Result<Self, DisplayError> {
        let (conn, screen_num) =
            x11rb::connect(None).map_err(|e| DisplayError::Connect(e.to_string()))?;
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| DisplayError::Connect(format!("screen {screen_num} not found")))?;
        let root = screen.root;
        info!(screen = screen_num, "connected to X server");
        Ok(Self {
            conn: Slot::new(conn),
            root,
        })
    }

    /// Drop the connection. Later calls fail with `ConnectionClosed`.
    pub fn close(&self) {
        if self.conn.close() {
            info!("X server connection closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_open()
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&RustConnection) -> Result<T, DisplayError>,
    ) -> Result<T, DisplayError> {
        let conn = self.conn.get()?;
        f(&*conn)
    }

    /// Absolute root coordinates of the window's top-left corner.
    pub fn window_origin(&self, window: WindowRef) -> Result<(i32, i32), DisplayError> {
        let root = self.root;
        self.with_conn(|conn| {
            let translated = conn
                .translate_coordinates(window.0, root, 0, 0)
                .map_err(request_err("translate_coordinates"))?
                .reply()
                .map_err(reply_err("translate_coordinates"))?;
            Ok((i32::from(translated.dst_x), i32::from(translated.dst_y)))
        })
    }

    /// Window title from `_NET_WM_NAME`, falling back to `WM_NAME`.
    pub fn window_name(&self, window: WindowRef) -> Result<Option<String>, DisplayError> {
        self.with_conn(|conn| {
            let net_wm_name = intern(conn, b"_NET_WM_NAME")?;
            let utf8 = intern(conn, b"UTF8_STRING")?;
            for (property, kind) in [
                (net_wm_name, utf8),
                (AtomEnum::WM_NAME.into(), AtomEnum::STRING.into()),
            ] {
                let reply = conn
                    .get_property(false, window.0, property, kind, 0, u32::MAX)
                    .map_err(request_err("get_property"))?
                    .reply()
                    .map_err(reply_err("get_property"))?;
                if !reply.value.is_empty() {
                    return Ok(Some(String::from_utf8_lossy(&reply.value).into_owned()));
                }
            }
            Ok(None)
        })
    }

    /// The window manager's `_NET_ACTIVE_WINDOW`, if any.
    pub fn active_window(&self) -> Result<Option<WindowRef>, DisplayError> {
        let root = self.root;
        self.with_conn(|conn| {
            let active_atom = intern(conn, b"_NET_ACTIVE_WINDOW")?;
            let reply = conn
                .get_property(false, root, active_atom, AtomEnum::WINDOW, 0, 1)
                .map_err(request_err("get_property"))?
                .reply()
                .map_err(reply_err("get_property"))?;

            let window = reply
                .value32()
                .and_then(|mut values| values.next())
                .map(WindowRef)
                .filter(WindowRef::is_set);
            Ok(window)
        })
    }
}

fn intern(conn: &RustConnection, name: &[u8]) -> Result<Atom, DisplayError> {
    Ok(conn
        .intern_atom(false, name)
        .map_err(request_err("intern_atom"))?
        .reply()
        .map_err(reply_err("intern_atom"))?
        .atom)
}

impl DisplayConnection for X11Connection {
    fn query_window(&self, window: WindowRef) -> Result<WindowGeometry, DisplayError> {
        self.with_conn(|conn| {
            // Send both requests before waiting on either reply.
            let attrs = conn
                .get_window_attributes(window.0)
                .map_err(request_err("get_window_attributes"))?;
            let geo = conn
                .get_geometry(window.0)
                .map_err(request_err("get_geometry"))?;

            let attrs = attrs.reply().map_err(reply_err("get_window_attributes"))?;
            let geo = geo.reply().map_err(reply_err("get_geometry"))?;

            Ok(WindowGeometry {
                viewable: attrs.map_state == MapState::VIEWABLE,
                width: geo.width,
                height: geo.height,
            })
        })
    }

    fn get_image(
        &self,
        window: WindowRef,
        rect: EffectiveRegion,
    ) -> Result<RawImage, DisplayError> {
        self.with_conn(|conn| {
            let reply = conn
                .get_image(
                    ImageFormat::Z_PIXMAP,
                    window.0,
                    rect.x,
                    rect.y,
                    rect.width,
                    rect.height,
                    !0,
                )
                .map_err(request_err("get_image"))?
                .reply()
                .map_err(reply_err("get_image"))?;
            debug!(
                %window,
                depth = reply.depth,
                bytes = reply.data.len(),
                "get_image"
            );
            Ok(RawImage {
                depth: reply.depth,
                data: reply.data,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn close_does_not_wait_for_requests_in_flight() {
        let slot = Arc::new(Slot::new(vec![7u8; 4]));
        // Stands in for a worker blocked in a reply.
        let in_flight = slot.get().unwrap();

        let (done_tx, done_rx) = bounded(1);
        let closer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                let closed = slot.close();
                let _ = done_tx.send(closed);
            })
        };
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(1)), Ok(true));
        closer.join().unwrap();

        assert!(!slot.is_open());
        assert!(matches!(slot.get(), Err(DisplayError::ConnectionClosed)));
        assert!(!slot.close());
        assert_eq!(*in_flight, vec![7u8; 4]);
    }
}
