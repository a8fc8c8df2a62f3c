//! The Error Responder (component B).
//!
//! Formats a fixed set of HTTP error pages, literally reproducing the HTML
//! bodies and content lengths from `sendErrorMessage` in
//! `proxy_server_with_cache.c`, and writes one in a single best-effort
//! `write`.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Formats `now` as an RFC 1123 GMT timestamp, e.g. `Tue, 15 Nov 1994 08:12:31 GMT`.
pub fn rfc1123_now() -> String {
    format_rfc1123(std::time::SystemTime::now())
}

fn format_rfc1123(time: std::time::SystemTime) -> String {
    let secs = time
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (year, month, day, hour, min, sec, weekday) = civil_from_unix(secs as i64);
    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        WEEKDAYS[weekday], day, MONTHS[(month - 1) as usize], year, hour, min, sec
    )
}

/// Converts a Unix timestamp into (year, month, day, hour, min, sec, weekday)
/// using Howard Hinnant's civil-from-days algorithm (no external date crate).
fn civil_from_unix(unix: i64) -> (i64, u32, u32, u32, u32, u32, usize) {
    let days = unix.div_euclid(86_400);
    let secs_of_day = unix.rem_euclid(86_400);
    let hour = (secs_of_day / 3600) as u32;
    let min = ((secs_of_day % 3600) / 60) as u32;
    let sec = (secs_of_day % 60) as u32;
    let weekday = ((days % 7 + 7 + 4) % 7) as usize; // unix epoch was a Thursday

    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { y + 1 } else { y };

    (year, month, day, hour, min, sec, weekday)
}

/// Header order varies by status in the original source: 403/404 put
/// `Content-Type` before `Connection`, the rest put `Connection` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderOrder {
    ConnectionFirst,
    ContentTypeFirst,
}

struct ErrorPage {
    reason: &'static str,
    body: &'static str,
    header_order: HeaderOrder,
}

fn page_for(status: u16) -> Option<ErrorPage> {
    use HeaderOrder::{ConnectionFirst, ContentTypeFirst};
    Some(match status {
        400 => ErrorPage {
            reason: "Bad Request",
            body: "<HTML><HEAD><TITLE>400 Bad Request</TITLE></HEAD>\n<BODY><H1>400 Bad Rqeuest</H1>\n</BODY></HTML>",
            header_order: ConnectionFirst,
        },
        403 => ErrorPage {
            reason: "Forbidden",
            body: "<HTML><HEAD><TITLE>403 Forbidden</TITLE></HEAD>\n<BODY><H1>403 Forbidden</H1><br>Permission Denied\n</BODY></HTML>",
            header_order: ContentTypeFirst,
        },
        404 => ErrorPage {
            reason: "Not Found",
            body: "<HTML><HEAD><TITLE>404 Not Found</TITLE></HEAD>\n<BODY><H1>404 Not Found</H1>\n</BODY></HTML>",
            header_order: ContentTypeFirst,
        },
        500 => ErrorPage {
            reason: "Internal Server Error",
            body: "<HTML><HEAD><TITLE>500 Internal Server Error</TITLE></HEAD>\n<BODY><H1>500 Internal Server Error</H1>\n</BODY></HTML>",
            header_order: ConnectionFirst,
        },
        501 => ErrorPage {
            reason: "Not Implemented",
            body: "<HTML><HEAD><TITLE>404 Not Implemented</TITLE></HEAD>\n<BODY><H1>501 Not Implemented</H1>\n</BODY></HTML>",
            header_order: ConnectionFirst,
        },
        505 => ErrorPage {
            reason: "HTTP Version Not Supported",
            body: "<HTML><HEAD><TITLE>505 HTTP Version Not Supported</TITLE></HEAD>\n<BODY><H1>505 HTTP Version Not Supported</H1>\n</BODY></HTML>",
            header_order: ConnectionFirst,
        },
        _ => return None,
    })
}

/// Formats and sends the error page for `status` to `stream` in one write.
///
/// Returns `Ok(true)` if a response was sent, `Ok(false)` if `status` is not
/// one of the six recognized codes (the "unknown code, no bytes sent"
/// sentinel), or the underlying I/O error on write failure.
pub async fn write_error(stream: &mut TcpStream, status: u16) -> std::io::Result<bool> {
    let Some(page) = page_for(status) else {
        return Ok(false);
    };

    let middle = match page.header_order {
        HeaderOrder::ConnectionFirst => "Connection: keep-alive\r\nContent-Type: text/html\r\n",
        HeaderOrder::ContentTypeFirst => "Content-Type: text/html\r\nConnection: keep-alive\r\n",
    };

    let message = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {len}\r\n{middle}Date: {date}\r\nServer: RONIN/14785\r\n\r\n{body}",
        status = status,
        reason = page.reason,
        len = page.body.len(),
        date = rfc1123_now(),
        body = page.body,
    );

    stream.write_all(message.as_bytes()).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_yields_no_page() {
        assert!(page_for(418).is_none());
        assert!(page_for(200).is_none());
    }

    #[test]
    fn known_statuses_have_matching_content_length() {
        for status in [400u16, 403, 404, 500, 501, 505] {
            let page = page_for(status).expect("known status");
            assert!(!page.body.is_empty());
            assert!(!page.reason.is_empty());
        }
    }

    #[test]
    fn header_order_matches_source_per_status() {
        for status in [400u16, 500, 501, 505] {
            let page = page_for(status).unwrap();
            assert_eq!(page.header_order, HeaderOrder::ConnectionFirst);
        }
        for status in [403u16, 404] {
            let page = page_for(status).unwrap();
            assert_eq!(page.header_order, HeaderOrder::ContentTypeFirst);
        }
    }

    #[test]
    fn rfc1123_format_matches_known_epoch_instant() {
        // 2021-01-01T00:00:00Z, a Friday.
        let formatted = format_rfc1123(std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_609_459_200));
        assert_eq!(formatted, "Fri, 01 Jan 2021 00:00:00 GMT");
    }

    #[test]
    fn rfc1123_format_handles_unix_epoch() {
        let formatted = format_rfc1123(std::time::UNIX_EPOCH);
        assert_eq!(formatted, "Thu, 01 Jan 1970 00:00:00 GMT");
    }
}
