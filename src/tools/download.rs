//! Downloading and decompressing reference files.

use std::path::Path;

use crate::{
    pipeline::stage::StageRequest,
    tools::{bash_request, shell_quote},
};

/// Fetch the gzipped file at `url` and decompress it to `target`.
pub fn wget_gunzip(name: &str, url: &str, target: &Path) -> StageRequest {
    bash_request(
        format!("download {}", name),
        &format!("wget -q -O - {} | gunzip -c", shell_quote(url)),
    )
    .stdout_to(target)
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    use pretty_assertions::assert_eq;

    #[test]
    fn wget_gunzip() {
        let request = super::wget_gunzip(
            "genome",
            "ftp://ftp.ensembl.org/pub/release-81/x.fa.gz",
            Path::new("/ref/x.fa"),
        );

        assert_eq!(request.program, "bash");
        assert_eq!(
            request.args[1],
            "set -euo pipefail; wget -q -O - ftp://ftp.ensembl.org/pub/release-81/x.fa.gz | gunzip -c"
        );
        assert_eq!(request.stdout, Some(PathBuf::from("/ref/x.fa")));
        assert_eq!(request.outputs, vec![PathBuf::from("/ref/x.fa")]);
    }
}
