//! Keystroke injection and screen snapshots for request/response clients.
//!
//! A client polls with the keys typed since its last request and receives the
//! screen as it stands shortly afterwards. The short delay gives the child a
//! chance to echo before rendering; output arriving later is picked up by the
//! next poll.

use serde::Serialize;
use webterm_vt::{RenderedState, Terminal};

use crate::error::Result;
use crate::session::Session;

/// Reply to a sync request.
///
/// Cursor position and screen size are only present while the cursor is
/// visible.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub cursor_visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_x: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_y: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u16>,
    pub rendered_state: RenderedState,
}

impl SnapshotResponse {
    /// Render `terminal`, in full or as a diff since its previous rendering.
    pub fn capture(terminal: &mut Terminal, full: bool) -> Self {
        let cursor = terminal.cursor();
        let visible = |value: u16| cursor.visible.then_some(value);
        Self {
            cursor_visible: cursor.visible,
            cursor_x: visible(cursor.x),
            cursor_y: visible(cursor.y),
            screen_width: visible(terminal.width()),
            screen_height: visible(terminal.height()),
            rendered_state: terminal.snapshot(full),
        }
    }
}

impl Session {
    /// Send `keystrokes` to the child, wait the coalescing delay, then render
    /// the screen.
    ///
    /// Keystrokes go straight to the child; whatever it echoes comes back
    /// through the pump. Empty or absent keystrokes write nothing.
    pub async fn sync_request(
        &self,
        keystrokes: Option<&[u8]>,
        full: bool,
    ) -> Result<SnapshotResponse> {
        if let Some(keys) = keystrokes.filter(|keys| !keys.is_empty()) {
            self.pty.write_all(keys)?;
        }

        tokio::time::sleep(self.config.poll_delay()).await;

        let mut terminal = self.lock_terminal()?;
        Ok(SnapshotResponse::capture(&mut terminal, full))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crate::config::SessionConfig;
    use crate::error::PtyError;
    use crate::pty::Pty;
    use crate::testing::ScriptedPty;

    fn scripted(width: u16, height: u16) -> (Arc<ScriptedPty>, Session) {
        let pty = Arc::new(ScriptedPty::new());
        let config = SessionConfig {
            poll_delay_ms: 1,
            ..SessionConfig::with_size(width, height)
        };
        let session = Session::with_pty(config, Arc::clone(&pty) as Arc<dyn Pty>).unwrap();
        (pty, session)
    }

    async fn wait_for_row(session: &Session, y: u16, expected: &str) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.lock_terminal().unwrap().row_text(y) != expected {
            assert!(Instant::now() < deadline, "row {y} never became {expected:?}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_capture_visible_cursor() {
        let mut terminal = Terminal::new(10, 3);
        terminal.consume(b"ab");

        let response = SnapshotResponse::capture(&mut terminal, true);
        assert!(response.cursor_visible);
        assert_eq!(response.cursor_x, Some(2));
        assert_eq!(response.cursor_y, Some(0));
        assert_eq!(response.screen_width, Some(10));
        assert_eq!(response.screen_height, Some(3));
        assert!(response.rendered_state.full);
        assert_eq!(response.rendered_state.cells.len(), 30);
    }

    #[test]
    fn test_hidden_cursor_omits_position_and_size() {
        let mut terminal = Terminal::new(10, 3);
        terminal.consume(b"\x1b[?25l");

        let response = SnapshotResponse::capture(&mut terminal, false);
        assert!(!response.cursor_visible);
        assert_eq!(response.cursor_x, None);
        assert_eq!(response.screen_width, None);

        let json = serde_json::to_value(&response).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object["cursorVisible"], false);
        assert!(!object.contains_key("cursorX"));
        assert!(!object.contains_key("cursorY"));
        assert!(!object.contains_key("screenWidth"));
        assert!(!object.contains_key("screenHeight"));
        assert!(object.contains_key("renderedState"));
    }

    #[test]
    fn test_json_field_names() {
        let mut terminal = Terminal::new(4, 2);
        let json = serde_json::to_value(SnapshotResponse::capture(&mut terminal, true)).unwrap();
        assert_eq!(json["cursorVisible"], true);
        assert_eq!(json["cursorX"], 0);
        assert_eq!(json["cursorY"], 0);
        assert_eq!(json["screenWidth"], 4);
        assert_eq!(json["screenHeight"], 2);
        assert_eq!(json["renderedState"]["full"], true);
        assert_eq!(json["renderedState"]["cells"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_sync_writes_keystrokes() {
        let (pty, session) = scripted(20, 4);
        session.sync_request(Some(b"ls\r".as_slice()), false).await.unwrap();
        assert_eq!(pty.written(), b"ls\r");
    }

    #[tokio::test]
    async fn test_empty_keystrokes_write_nothing() {
        let (pty, session) = scripted(20, 4);
        session.sync_request(Some(b"".as_slice()), false).await.unwrap();
        session.sync_request(None, false).await.unwrap();
        assert!(pty.written().is_empty());
    }

    #[tokio::test]
    async fn test_full_then_diff() {
        let (pty, session) = scripted(20, 4);
        pty.emit(b"hi");
        wait_for_row(&session, 0, "hi").await;

        let full = session.sync_request(None, true).await.unwrap();
        assert!(full.rendered_state.full);
        assert_eq!(full.rendered_state.cells.len(), 80);
        assert_eq!(full.cursor_x, Some(2));

        let diff = session.sync_request(None, false).await.unwrap();
        assert!(diff.rendered_state.is_unchanged());
        assert!(diff.cursor_visible);
    }

    #[tokio::test]
    async fn test_diff_reports_echoed_output() {
        let (pty, session) = scripted(20, 4);
        session.sync_request(None, true).await.unwrap();

        pty.emit(b"x");
        wait_for_row(&session, 0, "x").await;

        let diff = session.sync_request(None, false).await.unwrap();
        let cells = &diff.rendered_state.cells;
        assert_eq!(cells.len(), 1);
        assert_eq!((cells[0].x, cells[0].y, cells[0].cell.ch), (0, 0, 'x'));
        assert_eq!(diff.rendered_state.cursor.map(|c| c.x), Some(1));
    }

    #[tokio::test]
    async fn test_sync_after_kill_fails() {
        let (_pty, session) = scripted(20, 4);
        session.kill();

        let result = session.sync_request(Some(b"x".as_slice()), false).await;
        assert!(matches!(result, Err(PtyError::Stream(_))));

        // Rendering still works without keystrokes.
        assert!(session.sync_request(None, true).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_keystrokes_do_not_interleave() {
        let output = tempfile::NamedTempFile::new().unwrap();
        let path = output.path().to_str().unwrap().to_string();
        let session = Arc::new(
            Session::spawn(
                SessionConfig::default(),
                &["/bin/sh", "-c", "head -c 800 > \"$0\"", path.as_str()],
            )
            .unwrap(),
        );

        let tasks: Vec<_> = (0..8u8)
            .map(|i| {
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    let mut line = vec![b'a' + i; 99];
                    line.push(b'\n');
                    session.sync_request(Some(line.as_slice()), false).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut written = String::new();
        while Instant::now() < deadline {
            written = std::fs::read_to_string(output.path()).unwrap();
            if written.len() >= 800 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 8, "unexpected file contents: {written:?}");
        for line in lines {
            assert_eq!(line.len(), 99);
            let first = line.as_bytes()[0];
            assert!(line.bytes().all(|b| b == first), "interleaved line: {line}");
        }
    }
}
