//! A `redb::Key`/`Value` impl for `&Path`, so paths can be used directly as
//! table keys instead of going through an intermediate `String`.

use std::{ffi::OsStr, path::Path};

use redb::{Key, TypeName, Value};

#[derive(Debug)]
pub(crate) struct PathKey;

impl Key for PathKey {
    fn compare(data1: &[u8], data2: &[u8]) -> std::cmp::Ordering {
        data1.cmp(data2)
    }
}

impl Value for PathKey {
    type SelfType<'a> = &'a Path;
    type AsBytes<'a> = &'a [u8];

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        let os = unsafe { OsStr::from_encoded_bytes_unchecked(data) };
        Path::new(os)
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        value.as_os_str().as_encoded_bytes()
    }

    fn type_name() -> TypeName {
        TypeName::new(std::any::type_name::<Path>())
    }
}
