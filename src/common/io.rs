//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use flate2::bufread::MultiGzDecoder;

/// Transparently open a file with gzip decoder.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let file = File::open(path)?;
        let bufreader = BufReader::new(file);
        let decoder = MultiGzDecoder::new(bufreader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Write to `path` through a temporary file in the same directory.
///
/// The file at `path` only appears once `write` has returned successfully and
/// the data has been flushed.
pub fn write_atomically<P, F>(path: P, write: F) -> Result<(), anyhow::Error>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<(), anyhow::Error>,
{
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| anyhow::anyhow!("could not create temporary file in {:?}: {}", dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| anyhow::anyhow!("could not move temporary file to {:?}: {}", path, e))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};

    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case(true)]
    #[case(false)]
    fn read_maybe_gz(#[case] is_gzip: bool) -> Result<(), anyhow::Error> {
        let filename = if is_gzip { "test.txt.gz" } else { "test.txt" };
        let tmp_dir = temp_testdir::TempDir::default();

        {
            let file = std::fs::File::create(tmp_dir.join(filename))?;
            let mut f: Box<dyn Write> = if is_gzip {
                Box::new(flate2::write::GzEncoder::new(
                    file,
                    flate2::Compression::default(),
                ))
            } else {
                Box::new(file)
            };
            f.write_all(b"line 1\nline 2\n")?;
            f.flush()?;
        }

        let mut contents = String::new();
        super::open_read_maybe_gz(tmp_dir.join(filename))?.read_to_string(&mut contents)?;
        assert_eq!(contents, "line 1\nline 2\n");

        Ok(())
    }

    #[test]
    fn write_atomically_replaces_target() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("out.txt");
        std::fs::write(&path, "old")?;

        super::write_atomically(&path, |w| {
            w.write_all(b"new")?;
            Ok(())
        })?;

        assert_eq!(std::fs::read_to_string(&path)?, "new");
        Ok(())
    }
}
