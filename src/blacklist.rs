use crate::{error::Result, model::ChannelId};
use log::info;
use std::{collections::HashSet, fs, path::Path};

/// Channels that are never fetched, tallied or promoted.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    ids: HashSet<ChannelId>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// One channel id per line. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Self {
        text.lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty())
            .map(ChannelId::from)
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let blacklist = Self::parse(&fs::read_to_string(path)?);
        info!(
            "{} channels loaded from {} will not be expanded",
            blacklist.len(),
            path.display()
        );
        Ok(blacklist)
    }

    pub fn contains(&self, id: &ChannelId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<ChannelId> for Blacklist {
    fn from_iter<I: IntoIterator<Item = ChannelId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
