//! Command line surface of the `citator` binary

use anyhow::{bail, Result};
use chrono::NaiveDate;
use citator_common::OpinionSelection;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "citator")]
#[command(about = "Citation batch tools")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dispatch find-citations jobs for a selection of opinions
    FindCitations(FindCitationsArgs),

    /// Build the parallel citation graph and fill empty citation slots
    AddParallelCitations(ParallelCitationsArgs),
}

#[derive(Args, Debug, Default)]
pub struct FindCitationsArgs {
    /// Ids of citing opinions
    #[arg(long = "doc-id", value_delimiter = ',', num_args = 1..)]
    pub doc_ids: Vec<i64>,

    /// Start of an opinion id range (inclusive)
    #[arg(long)]
    pub start_id: Option<i64>,

    /// End of an opinion id range (inclusive)
    #[arg(long)]
    pub end_id: Option<i64>,

    /// Opinions filed on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub filed_after: Option<NaiveDate>,

    /// Opinions filed on or before this date (YYYY-MM-DD)
    #[arg(long)]
    pub filed_before: Option<NaiveDate>,

    /// Opinions from these courts
    #[arg(long = "court", value_delimiter = ',', num_args = 1..)]
    pub courts: Vec<String>,

    /// Every opinion
    #[arg(long)]
    pub all: bool,

    /// Named queue to dispatch to (see queue.queue_urls)
    #[arg(long)]
    pub queue: Option<String>,

    /// Queue backlog, in jobs, above which dispatch pauses
    #[arg(long)]
    pub throttle_min_items: Option<u64>,

    /// Opinions per dispatched job
    #[arg(long)]
    pub opinions_per_task: Option<usize>,

    /// Delete every unmatched citation row before dispatching
    #[arg(long, requires = "all")]
    pub wipe_unmatched: bool,
}

impl FindCitationsArgs {
    /// The single selection mode the flags describe
    pub fn selection(&self) -> Result<OpinionSelection> {
        let list = !self.doc_ids.is_empty();
        let range = self.start_id.is_some() || self.end_id.is_some();
        let filed = self.filed_after.is_some() || self.filed_before.is_some();
        let courts = !self.courts.is_empty();

        if list && (range || filed || courts || self.all) {
            bail!("--doc-id cannot be combined with other selection flags");
        }
        if self.wipe_unmatched && !self.all {
            bail!("--wipe-unmatched is only allowed with --all");
        }

        let modes = [list, range, filed, courts, self.all]
            .iter()
            .filter(|m| **m)
            .count();
        match modes {
            0 => bail!(
                "Please specify either a list of documents, a range of ids, \
                 a range of dates, a set of courts, or everything"
            ),
            1 => {}
            _ => bail!("Only one selection mode may be used at a time"),
        }

        if let (Some(start), Some(end)) = (self.start_id, self.end_id) {
            if start > end {
                bail!("--start-id {} is after --end-id {}", start, end);
            }
        }
        if let (Some(after), Some(before)) = (self.filed_after, self.filed_before) {
            if after > before {
                bail!("--filed-after {} is after --filed-before {}", after, before);
            }
        }

        Ok(if list {
            OpinionSelection::Ids(self.doc_ids.clone())
        } else if range {
            OpinionSelection::IdRange {
                start: self.start_id,
                end: self.end_id,
            }
        } else if filed {
            OpinionSelection::FiledRange {
                after: self.filed_after,
                before: self.filed_before,
            }
        } else if courts {
            OpinionSelection::Courts(self.courts.clone())
        } else {
            OpinionSelection::All
        })
    }
}

#[derive(Args, Debug, Default)]
pub struct ParallelCitationsArgs {
    /// Ids of opinions to read
    #[arg(long = "doc-id", value_delimiter = ',', num_args = 1..)]
    pub doc_ids: Vec<i64>,

    /// Read every opinion
    #[arg(long)]
    pub all: bool,

    /// Write promoted citations; without it the run only reports
    #[arg(long)]
    pub update_database: bool,

    /// Minimum edge weight to consider
    #[arg(long)]
    pub threshold: Option<u32>,

    /// Opinions per extraction task
    #[arg(long)]
    pub opinions_per_task: Option<usize>,
}

impl ParallelCitationsArgs {
    pub fn selection(&self) -> Result<OpinionSelection> {
        match (self.doc_ids.is_empty(), self.all) {
            (false, false) => Ok(OpinionSelection::Ids(self.doc_ids.clone())),
            (true, true) => Ok(OpinionSelection::All),
            (false, true) => bail!("--doc-id cannot be combined with --all"),
            (true, false) => bail!("Please specify either --doc-id or --all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn find_args(args: &[&str]) -> Result<FindCitationsArgs> {
        let argv = ["citator", "find-citations"].iter().chain(args.iter());
        let cli = Cli::try_parse_from(argv)?;
        match cli.command {
            Command::FindCitations(args) => Ok(args),
            other => bail!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_doc_id_list() {
        let args = find_args(&["--doc-id", "1,2", "--doc-id", "3"]).unwrap();
        assert_eq!(assert_ok!(args.selection()), OpinionSelection::Ids(vec![1, 2, 3]));
    }

    #[test]
    fn test_id_range() {
        let args = find_args(&["--start-id", "10"]).unwrap();
        assert_eq!(
            assert_ok!(args.selection()),
            OpinionSelection::IdRange {
                start: Some(10),
                end: None
            }
        );
    }

    #[test]
    fn test_filed_range() {
        let args = find_args(&["--filed-after", "2000-01-01"]).unwrap();
        assert_eq!(
            assert_ok!(args.selection()),
            OpinionSelection::FiledRange {
                after: NaiveDate::from_ymd_opt(2000, 1, 1),
                before: None
            }
        );
    }

    #[test]
    fn test_courts() {
        let args = find_args(&["--court", "ca2,scotus"]).unwrap();
        assert_eq!(
            assert_ok!(args.selection()),
            OpinionSelection::Courts(vec!["ca2".into(), "scotus".into()])
        );
    }

    #[test]
    fn test_list_combined_with_range_is_rejected() {
        let args = find_args(&["--doc-id", "1", "--start-id", "5"]).unwrap();
        assert_err!(args.selection());
    }

    #[test]
    fn test_no_selection_is_rejected() {
        let args = find_args(&[]).unwrap();
        assert_err!(args.selection());
    }

    #[test]
    fn test_two_modes_are_rejected() {
        let args = find_args(&["--all", "--court", "ca2"]).unwrap();
        assert_err!(args.selection());
    }

    #[test]
    fn test_wipe_requires_all() {
        assert_err!(find_args(&["--start-id", "1", "--wipe-unmatched"]));

        let args = find_args(&["--all", "--wipe-unmatched", "--queue", "batch2"]).unwrap();
        assert_eq!(assert_ok!(args.selection()), OpinionSelection::All);
        assert_eq!(args.queue.as_deref(), Some("batch2"));
    }

    #[test]
    fn test_parallel_selection() {
        let all = ParallelCitationsArgs {
            all: true,
            ..Default::default()
        };
        assert_eq!(assert_ok!(all.selection()), OpinionSelection::All);

        let both = ParallelCitationsArgs {
            all: true,
            doc_ids: vec![1],
            ..Default::default()
        };
        assert_err!(both.selection());
        assert_err!(ParallelCitationsArgs::default().selection());
    }
}
