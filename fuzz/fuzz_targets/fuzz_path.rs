// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for path parsing and splitting

#![no_main]

use chanfs_core::path::{split_path, FsPath};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(path) = FsPath::parse(input) else {
        assert!(split_path(input).is_err());
        return;
    };

    // Normalized form parses back to the same path
    let rendered = path.to_path_string();
    assert_eq!(FsPath::parse(&rendered).ok(), Some(path.clone()));

    match path.split() {
        Ok((parent, name)) => {
            assert_eq!(parent.join(&name).ok(), Some(path.clone()));
            assert_eq!(path.parent(), Some(parent));
            assert_eq!(split_path(input).map(|(_, n)| n).ok(), Some(name));
        }
        Err(_) => assert!(path.is_root()),
    }
});
