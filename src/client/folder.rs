//! Folder operations: listing, status, lifecycle, selection.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::command::Param;
use crate::parser::{Item, Response};
use crate::types::{Folder, FolderInformation};
use crate::{Error, Result};

use super::ImapClient;

impl<S> ImapClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Selects a folder for read-write access.
    ///
    /// Reselecting the already-selected folder in the same mode is a
    /// no-op unless `force` is set.
    pub async fn folder_select(&mut self, name: &str, force: bool) -> Result<FolderInformation> {
        self.select_or_examine(name, true, force).await
    }

    /// Opens a folder read-only, unless
    /// [`force_select_on_examine`](Self::force_select_on_examine) turns
    /// the request into a SELECT.
    pub async fn folder_examine(&mut self, name: &str, force: bool) -> Result<FolderInformation> {
        let writable = self.force_select_on_examine;
        self.select_or_examine(name, writable, force).await
    }

    async fn select_or_examine(
        &mut self,
        name: &str,
        writable: bool,
        force: bool,
    ) -> Result<FolderInformation> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty folder name".to_string()));
        }
        if !force {
            if let Some(info) = self.folder.as_ref() {
                if info.name == name && info.is_writable == writable {
                    return Ok(info.clone());
                }
            }
        }

        let command = if writable { "SELECT" } else { "EXAMINE" };
        let batch = self
            .send_request_checked(command, &[Param::quoted(name)], false)
            .await?;
        let info = build_folder_information(&batch, name, writable);
        self.folder = Some(info.clone());
        Ok(info)
    }

    /// Closes the selected folder without expunging, when the server
    /// supports UNSELECT. Does nothing when no folder is selected.
    pub async fn folder_unselect(&mut self) -> Result<()> {
        if self.folder.is_some() && self.is_supported("UNSELECT").await? {
            self.send_request_checked("UNSELECT", &[], false).await?;
            self.folder = None;
        }
        Ok(())
    }

    /// Creates a folder.
    pub async fn folder_create(&mut self, name: &str) -> Result<()> {
        self.named_folder_command("CREATE", name).await
    }

    /// Deletes a folder.
    pub async fn folder_delete(&mut self, name: &str) -> Result<()> {
        self.named_folder_command("DELETE", name).await
    }

    /// Adds a folder to the subscription list.
    pub async fn folder_subscribe(&mut self, name: &str) -> Result<()> {
        self.named_folder_command("SUBSCRIBE", name).await
    }

    /// Removes a folder from the subscription list.
    pub async fn folder_unsubscribe(&mut self, name: &str) -> Result<()> {
        self.named_folder_command("UNSUBSCRIBE", name).await
    }

    /// Renames a folder.
    pub async fn folder_rename(&mut self, from: &str, to: &str) -> Result<()> {
        if from.is_empty() || to.is_empty() {
            return Err(Error::InvalidArgument("empty folder name".to_string()));
        }
        self.send_request_checked("RENAME", &[Param::quoted(from), Param::quoted(to)], false)
            .await?;
        Ok(())
    }

    async fn named_folder_command(&mut self, command: &str, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty folder name".to_string()));
        }
        self.send_request_checked(command, &[Param::quoted(name)], false)
            .await?;
        Ok(())
    }

    /// Queries STATUS items for a folder without selecting it.
    pub async fn folder_status(
        &mut self,
        name: &str,
        items: &[&str],
    ) -> Result<HashMap<String, String>> {
        if name.is_empty() || items.is_empty() {
            return Err(Error::InvalidArgument(
                "STATUS requires a folder and at least one item".to_string(),
            ));
        }
        let list = Param::List(items.iter().map(|i| Param::raw(*i)).collect());
        let batch = self
            .send_request_checked("STATUS", &[Param::quoted(name), list], false)
            .await?;
        Ok(batch
            .iter()
            .filter(|u| u.is_untagged())
            .find(|u| {
                u.item_atom(1)
                    .is_some_and(|a| a.eq_ignore_ascii_case("STATUS"))
            })
            .and_then(|u| u.item_list(3))
            .map(status_pairs)
            .unwrap_or_default())
    }

    /// Lists folders under `parent` matching `pattern` (`*` when empty).
    pub async fn folder_list(&mut self, parent: &str, pattern: &str) -> Result<Vec<Folder>> {
        self.folder_list_internal(false, parent, pattern, false)
            .await
    }

    /// Lists subscribed folders.
    pub async fn folder_subscribe_list(
        &mut self,
        parent: &str,
        pattern: &str,
    ) -> Result<Vec<Folder>> {
        self.folder_list_internal(true, parent, pattern, false)
            .await
    }

    /// Lists folders with STATUS values attached in one round trip when
    /// the server supports LIST-STATUS.
    pub async fn folder_status_list(
        &mut self,
        parent: &str,
        pattern: &str,
    ) -> Result<Vec<Folder>> {
        self.folder_list_internal(false, parent, pattern, true)
            .await
    }

    async fn folder_list_internal(
        &mut self,
        subscribed: bool,
        parent: &str,
        pattern: &str,
        with_status: bool,
    ) -> Result<Vec<Folder>> {
        let command = if subscribed { "LSUB" } else { "LIST" };
        let pattern = if pattern.is_empty() { "*" } else { pattern };

        let mut params = vec![Param::quoted(parent), Param::quoted(pattern)];
        let mut status_attached = false;
        if with_status && !subscribed && self.is_supported("LIST-STATUS").await? {
            status_attached = true;
            params.push(Param::raw("RETURN"));
            params.push(Param::List(vec![
                Param::raw("STATUS"),
                Param::List(vec![
                    Param::raw("MESSAGES"),
                    Param::raw("UNSEEN"),
                    Param::raw("UIDNEXT"),
                ]),
            ]));
        }

        let batch = self.send_request_checked(command, &params, false).await?;
        let mut folders = folders_from_batch(&batch, command, status_attached);

        // the root listing always carries the INBOX
        if parent.is_empty() && pattern == "*" && !folders.iter().any(Folder::is_inbox) {
            folders.insert(
                0,
                Folder {
                    name: "INBOX".to_string(),
                    delimiter: "/".to_string(),
                    attributes: Vec::new(),
                    status: None,
                },
            );
        }
        Ok(folders)
    }
}

fn atoms_of(list: &[Item]) -> Vec<String> {
    list.iter()
        .filter_map(Item::as_atom)
        .map(str::to_string)
        .collect()
}

fn parse_num<T: std::str::FromStr>(item: Option<&Item>) -> Option<T> {
    item.and_then(Item::as_atom).and_then(|a| a.parse().ok())
}

fn status_pairs(list: &[Item]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut i = 0;
    while i + 1 < list.len() {
        if let (Some(key), Some(value)) = (list[i].as_atom(), list[i + 1].as_text()) {
            map.insert(key.to_ascii_uppercase(), value.into_owned());
        }
        i += 2;
    }
    map
}

/// Rebuilds the selected-folder snapshot from a SELECT/EXAMINE batch.
fn build_folder_information(batch: &[Response], name: &str, writable: bool) -> FolderInformation {
    let mut info = FolderInformation {
        name: name.to_string(),
        is_writable: writable,
        ..FolderInformation::default()
    };

    for unit in batch.iter().filter(|u| u.is_untagged()) {
        if unit
            .item_atom(1)
            .is_some_and(|a| a.eq_ignore_ascii_case("FLAGS"))
        {
            if let Some(list) = unit.item_list(2) {
                info.flags = atoms_of(list);
            }
        }

        if let Some(code) = unit.optional_code() {
            let opt = unit.optional.as_deref().unwrap_or_default();
            match code.as_str() {
                "PERMANENTFLAGS" => {
                    if let Some(list) = opt.get(1).and_then(Item::as_list) {
                        info.permanent_flags = atoms_of(list);
                    }
                }
                "UIDVALIDITY" => info.uidvalidity = parse_num(opt.get(1)),
                "UIDNEXT" => info.uidnext = parse_num(opt.get(1)),
                "UNSEEN" => info.unseen = parse_num(opt.get(1)),
                "HIGHESTMODSEQ" => info.highest_mod_seq = parse_num(opt.get(1)),
                _ => {}
            }
        }

        if let (Some(count), Some(word)) =
            (unit.item_atom(1).and_then(|a| a.parse::<u32>().ok()), unit.item_atom(2))
        {
            match word.to_ascii_uppercase().as_str() {
                "EXISTS" => info.exists = Some(count),
                "RECENT" => info.recent = Some(count),
                _ => {}
            }
        }
    }
    info
}

/// Collects folders from LIST/LSUB units, attaching STATUS data from
/// interleaved `* STATUS` units when LIST-STATUS was requested.
fn folders_from_batch(batch: &[Response], command: &str, with_status: bool) -> Vec<Folder> {
    let mut folders: Vec<Folder> = Vec::new();
    for unit in batch.iter().filter(|u| u.is_untagged()) {
        if !unit
            .item_atom(1)
            .is_some_and(|a| a.eq_ignore_ascii_case(command))
            || unit.items.len() < 5
        {
            continue;
        }
        let Some(name) = unit.items.get(4).and_then(Item::as_text) else {
            continue;
        };
        let delimiter = unit
            .items
            .get(3)
            .and_then(Item::as_text)
            .map_or_else(|| "NIL".to_string(), |d| d.into_owned());
        folders.push(Folder {
            name: name.into_owned(),
            delimiter,
            attributes: unit.item_list(2).map(atoms_of).unwrap_or_default(),
            status: None,
        });
    }

    if with_status {
        for unit in batch.iter().filter(|u| u.is_untagged()) {
            if !unit
                .item_atom(1)
                .is_some_and(|a| a.eq_ignore_ascii_case("STATUS"))
            {
                continue;
            }
            let Some(name) = unit.items.get(2).and_then(Item::as_text) else {
                continue;
            };
            if let Some(folder) = folders.iter_mut().find(|f| f.name == name.as_ref()) {
                folder.status = unit.item_list(3).map(status_pairs);
            }
        }
    }
    folders
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::parser::ResponseKind;

    fn atom(s: &str) -> Item {
        Item::Atom(s.to_string())
    }

    fn untagged(items: Vec<Item>) -> Response {
        let status_or_index = items
            .get(1)
            .and_then(Item::as_atom)
            .unwrap_or_default()
            .to_ascii_uppercase();
        let is_status = matches!(
            status_or_index.as_str(),
            "OK" | "NO" | "BAD" | "BYE" | "PREAUTH"
        );
        Response {
            tag: "*".to_string(),
            kind: ResponseKind::Untagged,
            status_or_index,
            is_status,
            items,
            ..Response::default()
        }
    }

    fn code_unit(optional: Vec<Item>) -> Response {
        Response {
            optional: Some(optional),
            ..untagged(vec![atom("*"), atom("OK")])
        }
    }

    #[test]
    fn folder_information_from_select_batch() {
        let batch = vec![
            untagged(vec![
                atom("*"),
                atom("FLAGS"),
                Item::List(vec![atom("\\Seen"), atom("\\Deleted")]),
            ]),
            code_unit(vec![
                atom("PERMANENTFLAGS"),
                Item::List(vec![atom("\\Seen"), atom("\\*")]),
            ]),
            untagged(vec![atom("*"), atom("172"), atom("EXISTS")]),
            untagged(vec![atom("*"), atom("1"), atom("RECENT")]),
            code_unit(vec![atom("UNSEEN"), atom("12")]),
            code_unit(vec![atom("UIDVALIDITY"), atom("3857529045")]),
            code_unit(vec![atom("UIDNEXT"), atom("4392")]),
            code_unit(vec![atom("HIGHESTMODSEQ"), atom("715194045007")]),
        ];
        let info = build_folder_information(&batch, "INBOX", true);
        assert_eq!(info.name, "INBOX");
        assert!(info.is_writable);
        assert_eq!(info.flags, vec!["\\Seen", "\\Deleted"]);
        assert_eq!(info.permanent_flags, vec!["\\Seen", "\\*"]);
        assert_eq!(info.exists, Some(172));
        assert_eq!(info.recent, Some(1));
        assert_eq!(info.unseen, Some(12));
        assert_eq!(info.uidvalidity, Some(3857529045));
        assert_eq!(info.uidnext, Some(4392));
        assert_eq!(info.highest_mod_seq, Some(715194045007));
    }

    #[test]
    fn folder_information_defaults_when_unannounced() {
        let info = build_folder_information(&[], "Archive", false);
        assert_eq!(info.name, "Archive");
        assert!(!info.is_writable);
        assert!(info.uidvalidity.is_none());
        assert!(info.exists.is_none());
    }

    #[test]
    fn folders_from_list_units() {
        let batch = vec![
            untagged(vec![
                atom("*"),
                atom("LIST"),
                Item::List(vec![atom("\\HasNoChildren")]),
                atom("/"),
                atom("Sent"),
            ]),
            untagged(vec![
                atom("*"),
                atom("LIST"),
                Item::List(vec![]),
                atom("/"),
                Item::Literal(b"Entw\xc3\xbcrfe".to_vec()),
            ]),
        ];
        let folders = folders_from_batch(&batch, "LIST", false);
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name, "Sent");
        assert_eq!(folders[0].delimiter, "/");
        assert!(folders[0].has_attribute("\\HasNoChildren"));
        assert_eq!(folders[1].name, "Entw\u{fc}rfe");
    }

    #[test]
    fn truncated_list_units_are_skipped() {
        let batch = vec![untagged(vec![atom("*"), atom("LIST"), atom("/")])];
        assert!(folders_from_batch(&batch, "LIST", false).is_empty());
    }

    #[test]
    fn list_status_units_attach_to_folders() {
        let batch = vec![
            untagged(vec![
                atom("*"),
                atom("LIST"),
                Item::List(vec![]),
                atom("."),
                atom("INBOX"),
            ]),
            untagged(vec![
                atom("*"),
                atom("STATUS"),
                atom("INBOX"),
                Item::List(vec![
                    atom("MESSAGES"),
                    atom("17"),
                    atom("UNSEEN"),
                    atom("3"),
                ]),
            ]),
        ];
        let folders = folders_from_batch(&batch, "LIST", true);
        let status = folders[0].status.as_ref().unwrap();
        assert_eq!(status.get("MESSAGES").unwrap(), "17");
        assert_eq!(status.get("UNSEEN").unwrap(), "3");
    }

    #[test]
    fn status_pairs_uppercase_keys() {
        let map = status_pairs(&[atom("Messages"), atom("5")]);
        assert_eq!(map.get("MESSAGES").unwrap(), "5");
    }
}
