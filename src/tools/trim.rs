//! Adapter and quality trimming with skewer.

use std::path::{Path, PathBuf};

use crate::pipeline::{params::FastqSet, stage::StageRequest};

/// Minimal 3' quality kept by the trimmer.
pub const MIN_QUALITY: u8 = 20;

/// Inputs of one trimming run.
#[derive(Debug, Clone)]
pub struct Trim<'a> {
    pub fastqs: &'a FastqSet,
    pub adapters: &'a Path,
    pub out_dir: &'a Path,
    pub threads: usize,
}

/// Files written by skewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trimmed {
    pub fastqs: FastqSet,
    pub log: PathBuf,
}

impl Trim<'_> {
    /// Output prefix `<out_dir>/<stem>`.
    fn prefix(&self) -> PathBuf {
        self.out_dir.join(self.fastqs.prefix())
    }

    /// Where skewer will put its outputs.
    pub fn trimmed(&self) -> Trimmed {
        let prefix = self.prefix().to_string_lossy().into_owned();
        let fastqs = if self.fastqs.is_paired() {
            FastqSet::new(
                PathBuf::from(format!("{}-trimmed-pair1.fastq", prefix)),
                Some(PathBuf::from(format!("{}-trimmed-pair2.fastq", prefix))),
            )
        } else {
            FastqSet::new(PathBuf::from(format!("{}-trimmed.fastq", prefix)), None)
        };
        Trimmed {
            fastqs,
            log: PathBuf::from(format!("{}-trimmed.log", prefix)),
        }
    }

    pub fn request(&self) -> StageRequest {
        let trimmed = self.trimmed();
        let mut request = StageRequest::new(format!("trim {}", self.fastqs.prefix()), "skewer")
            .opt("-q", MIN_QUALITY.to_string())
            .path_opt("-o", &self.prefix())
            .opt("-t", self.threads.to_string())
            .path_opt("-x", self.adapters)
            .input(self.adapters)
            .inputs(self.fastqs.paths());
        for path in self.fastqs.paths() {
            request = request.path_arg(path);
        }
        request.outputs(trimmed.fastqs.paths()).output(trimmed.log)
    }
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn paired_request() {
        let fastqs = FastqSet::new("/reads/s_1.fastq.gz".into(), Some("/reads/s_2.fastq.gz".into()));
        let trim = Trim {
            fastqs: &fastqs,
            adapters: Path::new("/ref/adapters.fa"),
            out_dir: Path::new("/out"),
            threads: 4,
        };

        let request = trim.request();

        assert_eq!(
            request.command_line(),
            "skewer -q 20 -o /out/s_1 -t 4 -x /ref/adapters.fa /reads/s_1.fastq.gz /reads/s_2.fastq.gz"
        );
        assert_eq!(
            request.outputs,
            vec![
                PathBuf::from("/out/s_1-trimmed-pair1.fastq"),
                PathBuf::from("/out/s_1-trimmed-pair2.fastq"),
                PathBuf::from("/out/s_1-trimmed.log"),
            ]
        );
    }

    #[test]
    fn single_request() {
        let fastqs = FastqSet::new("/reads/s.fq".into(), None);
        let trim = Trim {
            fastqs: &fastqs,
            adapters: Path::new("/ref/adapters.fa"),
            out_dir: Path::new("/out"),
            threads: 1,
        };

        assert_eq!(
            trim.trimmed().fastqs,
            FastqSet::new("/out/s-trimmed.fastq".into(), None)
        );
        assert_eq!(trim.request().inputs.len(), 2);
    }
}
