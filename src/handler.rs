//! Daytime session handler
//!
//! Sends one timestamp line when a session opens and closes the session once
//! that line has been flushed. Holds no per-session state: the transport's
//! callback ordering is what guarantees the close follows the write.

use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::debug;

use crate::transport::{Buffer, MessageId, Session, SessionListener, SessionService};

/// English weekday and month names, 24-hour clock, zone after a dash.
pub const DAYTIME_FORMAT: &str = "%A, %B %-d, %Y %H:%M:%S-%Z";

/// Render `now` as a daytime line, CRLF included.
pub fn render_daytime<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}\r\n", now.format(DAYTIME_FORMAT))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DaytimeHandler {
    utc: bool,
}

impl DaytimeHandler {
    pub fn new(utc: bool) -> Self {
        Self { utc }
    }

    fn now_line(&self) -> String {
        if self.utc {
            render_daytime(&Utc::now())
        } else {
            render_daytime(&Local::now())
        }
    }
}

impl SessionListener for DaytimeHandler {
    fn on_session_opened(&self, service: &dyn SessionService, session: &Session) {
        debug_assert!(session.is_open(), "opened event for a non-open session");

        let mut out: Buffer = session.create_buffer();
        out.write_ascii(&self.now_line());
        service.write(session, out);
    }

    // Exactly one message goes out per session, so the id needs no tracking.
    fn on_message_sent(&self, service: &dyn SessionService, session: &Session, _msg: MessageId) {
        debug!("{}: daytime delivered, closing", session.id());
        service.close_session(session);
    }
}
