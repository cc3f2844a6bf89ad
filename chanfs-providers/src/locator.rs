// SPDX-License-Identifier: AGPL-3.0-or-later
//! `channel/message-id` locators shared by the bundled backends

use chanfs_core::{ChanfsError, ChanfsResult, ContentLocator};

pub(crate) fn encode(channel: &str, message_id: u64) -> ContentLocator {
    ContentLocator::new(format!("{channel}/{message_id}"))
}

pub(crate) fn decode<'a>(backend: &str, locator: &'a ContentLocator) -> ChanfsResult<(&'a str, u64)> {
    locator
        .as_str()
        .rsplit_once('/')
        .and_then(|(channel, id)| Some((channel, id.parse().ok()?)))
        .filter(|(channel, _)| !channel.is_empty())
        .ok_or_else(|| ChanfsError::Backend {
            backend: backend.to_string(),
            message: format!("malformed locator: {locator}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_slash_in_channel() {
        let locator = encode("team/content", 42);
        assert_eq!(decode("t", &locator).unwrap(), ("team/content", 42));
    }

    #[test]
    fn test_malformed() {
        for raw in ["", "no-slash", "/7", "chan/abc"] {
            assert!(decode("t", &ContentLocator::new(raw)).is_err(), "{raw}");
        }
    }
}
