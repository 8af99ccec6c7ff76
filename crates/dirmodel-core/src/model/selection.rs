/// Selection held by identity so it survives a full collection swap.
use super::contents::DirectoryContents;
use super::entry::EntryUrl;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileListSelection {
    selected: Vec<EntryUrl>,
    lead: Option<EntryUrl>,
}

impl FileListSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> &[EntryUrl] {
        &self.selected
    }

    pub fn lead(&self) -> Option<&EntryUrl> {
        self.lead.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn contains(&self, url: &EntryUrl) -> bool {
        self.selected.contains(url)
    }

    /// Replace the selection. The last url becomes the lead.
    pub fn select(&mut self, urls: impl IntoIterator<Item = EntryUrl>) {
        self.selected.clear();
        for url in urls {
            if !self.selected.contains(&url) {
                self.selected.push(url);
            }
        }
        self.lead = self.selected.last().cloned();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.lead = None;
    }

    /// Follow an entry across a rename.
    pub fn rename(&mut self, from: &EntryUrl, to: &EntryUrl) {
        for url in self.selected.iter_mut().filter(|u| *u == from) {
            *url = to.clone();
        }
        if self.lead.as_ref() == Some(from) {
            self.lead = Some(to.clone());
        }
    }

    /// Drop selected urls that no longer resolve in `contents`.
    ///
    /// Returns `true` if the selection changed.
    pub fn reconcile(&mut self, contents: &DirectoryContents) -> bool {
        let before = self.selected.len();
        self.selected.retain(|url| contents.find_index(url).is_some());
        let lead_lost = self
            .lead
            .as_ref()
            .is_some_and(|lead| contents.find_index(lead).is_none());
        if lead_lost {
            self.lead = self.selected.last().cloned();
        }
        before != self.selected.len() || lead_lost
    }
}
