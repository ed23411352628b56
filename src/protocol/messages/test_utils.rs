macro_rules! assert_write_versioned {
    ($req:expr, $version:expr, $want: expr) => {
        let mut buf = Vec::new();
        $req.write_versioned(&mut buf, ApiVersion::new($version))
            .unwrap();
        assert_eq!(buf, $want);
    };
}

pub(crate) use assert_write_versioned;

macro_rules! assert_read_versioned {
    ($t:ty, $input:expr, $version:expr, $want:expr) => {
        let mut reader = std::io::Cursor::new($input);
        let got = <$t>::read_versioned(&mut reader, ApiVersion::new($version)).unwrap();
        assert_eq!($want, got);
        assert_eq!(
            reader.position() as usize,
            reader.get_ref().len(),
            "trailing bytes"
        );
    };
}

pub(crate) use assert_read_versioned;
