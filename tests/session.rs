//! End-to-end sessions against a scripted server.
//!
//! Each test builds a mock stream with the exact bytes the client must
//! write and the replies the server sends back, then drives the real
//! client through it. Any unexpected command or missing read fails the
//! test through the mock itself.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use letterbox_imap::{
    AuthState, Error, FetchItem, ImapClient, Item, LoginOptions, ThreadNode,
};
use tokio_test::io::{Builder, Mock};

async fn client_with(script: &mut Builder) -> ImapClient<Mock> {
    ImapClient::from_stream(script.build()).await.unwrap()
}

fn greeting(caps: &str) -> Vec<u8> {
    format!("* OK [CAPABILITY {caps}] ready\r\n").into_bytes()
}

#[tokio::test]
async fn greeting_capabilities_answer_checks_without_traffic() {
    let mut client = client_with(
        Builder::new().read(&greeting("IMAP4rev1 SORT THREAD=REFERENCES")),
    )
    .await;
    // no further script entries: any command here would panic the mock
    assert!(client.is_supported("sort").await.unwrap());
    assert!(client.is_supported("THREAD=REFERENCES").await.unwrap());
    assert!(!client.is_supported("QUOTA").await.unwrap());
    assert!(!client.is_supported("").await.unwrap());
}

#[tokio::test]
async fn capability_command_populates_empty_cache() {
    let mut client = client_with(
        Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1 SORT\r\nTAG1 OK done\r\n"),
    )
    .await;
    assert!(client.cached_capabilities().is_none());
    assert!(client.is_supported("SORT").await.unwrap());
    // second check hits the cache
    assert!(client.is_supported("IMAP4rev1").await.unwrap());
}

#[tokio::test]
async fn login_auth_plain_and_cache_invalidation() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1 AUTH=PLAIN"))
            .write(b"TAG1 AUTHENTICATE PLAIN\r\n")
            .read(b"+ \r\n")
            .write(b"AHVzZXIAcGFzcw==\r\n")
            .read(b"TAG1 OK authenticated\r\n"),
    )
    .await;
    client
        .login("user", "pass", &LoginOptions::default())
        .await
        .unwrap();
    assert_eq!(client.auth_state(), AuthState::Authenticated);
    assert_eq!(client.logged_in_user(), Some("user"));
    // a successful login drops the advertisement from before auth
    assert!(client.cached_capabilities().is_none());
}

#[tokio::test]
async fn login_fallback_rejection_is_bad_credentials() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 LOGIN \"user\" \"wrong\"\r\n")
            .read(b"TAG1 NO [AUTHENTICATIONFAILED] invalid credentials\r\n"),
    )
    .await;
    let err = client
        .login("user", "wrong", &LoginOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadCredentials(_)));
    assert_eq!(client.auth_state(), AuthState::Failed);
}

#[tokio::test]
async fn proxy_login_records_primary_identity() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 LOGIN \"admin\" \"pw\"\r\n")
            .read(b"TAG1 OK done\r\n")
            .write(b"TAG2 PROXYAUTH \"bob\"\r\n")
            .read(b"TAG2 OK done\r\n"),
    )
    .await;
    let options = LoginOptions {
        proxy_auth_user: Some("bob".to_string()),
        ..LoginOptions::default()
    };
    client.login("admin", "pw", &options).await.unwrap();
    assert_eq!(client.logged_in_user(), Some("admin"));
}

#[tokio::test]
async fn login_xoauth2_failure_handshake() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1 AUTH=XOAUTH2"))
            .write(b"TAG1 AUTHENTICATE XOAUTH2 dG9rZW4=\r\n")
            .read(b"+ eyJzdGF0dXMiOiI0MDEifQ==\r\n")
            .write(b"\r\n")
            .read(b"TAG1 NO auth failed\r\n"),
    )
    .await;
    let err = client.login_xoauth2("dG9rZW4=").await.unwrap_err();
    assert!(matches!(err, Error::BadCredentials(_)));
}

const SELECT_REPLY: &[u8] = b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen)\r\n\
* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] limited\r\n\
* 172 EXISTS\r\n\
* 1 RECENT\r\n\
* OK [UNSEEN 12] first unseen\r\n\
* OK [UIDVALIDITY 3857529045] UIDs valid\r\n\
* OK [UIDNEXT 4392] predicted next UID\r\n\
TAG1 OK [READ-WRITE] SELECT completed\r\n";

#[tokio::test]
async fn select_builds_folder_information() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 SELECT \"INBOX\"\r\n")
            .read(SELECT_REPLY),
    )
    .await;
    let info = client.folder_select("INBOX", false).await.unwrap();
    assert_eq!(info.name, "INBOX");
    assert!(info.is_writable);
    assert_eq!(info.flags.len(), 4);
    assert_eq!(info.permanent_flags, vec!["\\Deleted", "\\Seen", "\\*"]);
    assert_eq!(info.exists, Some(172));
    assert_eq!(info.recent, Some(1));
    assert_eq!(info.unseen, Some(12));
    assert_eq!(info.uidvalidity, Some(3_857_529_045));
    assert_eq!(info.uidnext, Some(4392));

    // reselecting the same folder is a no-op: the script has no more
    // entries, so any command would panic the mock
    let again = client.folder_select("INBOX", false).await.unwrap();
    assert_eq!(again, info);
}

#[tokio::test]
async fn unselect_clears_selection() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1 UNSELECT"))
            .write(b"TAG1 SELECT \"INBOX\"\r\n")
            .read(SELECT_REPLY)
            .write(b"TAG2 UNSELECT\r\n")
            .read(b"TAG2 OK done\r\n"),
    )
    .await;
    client.folder_select("INBOX", false).await.unwrap();
    assert!(client.folder_information().is_some());
    client.folder_unselect().await.unwrap();
    assert!(client.folder_information().is_none());
}

#[tokio::test]
async fn fetch_streams_literal_to_sink_and_keeps_tree_usable() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink_buf = captured.clone();
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 UID FETCH 1:* (UID BODY.PEEK[])\r\n")
            .read(b"* 1 FETCH (UID 7 BODY[] {5}\r\nhello)\r\nTAG1 OK done\r\n"),
    )
    .await;

    let fetched = client
        .fetch(
            vec![
                FetchItem::plain("UID"),
                FetchItem::streamed(
                    "BODY.PEEK[]",
                    Box::new(move |data: &[u8]| {
                        sink_buf.lock().unwrap().extend_from_slice(data);
                        Ok(())
                    }),
                ),
            ],
            "1:*",
            true,
        )
        .await
        .unwrap();

    assert_eq!(&*captured.lock().unwrap(), b"hello");
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].index, 1);
    assert_eq!(fetched[0].uid(), Some(7));
    // the streamed value left only a placeholder in the tree
    assert_eq!(fetched[0].value("BODY[]"), Some(&Item::Atom(String::new())));
}

#[tokio::test]
async fn fetch_buffers_literal_without_sink() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 FETCH 1 (BODY[1])\r\n")
            .read(b"* 1 FETCH (BODY[1] {5}\r\nhello)\r\nTAG1 OK done\r\n"),
    )
    .await;
    let fetched = client
        .fetch(vec![FetchItem::plain("BODY[1]")], "1", false)
        .await
        .unwrap();
    assert_eq!(
        fetched[0].value("BODY[1]"),
        Some(&Item::Literal(b"hello".to_vec()))
    );
}

#[tokio::test]
async fn search_result_is_reversed() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 UID SEARCH UNSEEN\r\n")
            .read(b"* SEARCH 5 4 2\r\nTAG1 OK done\r\n"),
    )
    .await;
    let ids = client.search("UNSEEN", true).await.unwrap();
    assert_eq!(ids, vec![2, 4, 5]);
}

#[tokio::test]
async fn search_with_literal_waits_for_continuation() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 UID SEARCH CHARSET UTF-8 TEXT {4}\r\n")
            .read(b"+ \r\n")
            .write(b"mail\r\n")
            .read(b"* SEARCH 3 1\r\nTAG1 OK done\r\n"),
    )
    .await;
    let ids = client
        .search("CHARSET UTF-8 TEXT {4}\r\nmail", true)
        .await
        .unwrap();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn search_with_multiple_literals_loops_on_continuations() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 UID SEARCH FROM {2}\r\n")
            .read(b"+ \r\n")
            .write(b"ab TO {2}\r\n")
            .read(b"+ \r\n")
            .write(b"cd\r\n")
            .read(b"* SEARCH 9 8\r\nTAG1 OK done\r\n"),
    )
    .await;
    let ids = client
        .search("FROM {2}\r\nab TO {2}\r\ncd", true)
        .await
        .unwrap();
    assert_eq!(ids, vec![8, 9]);
}

#[tokio::test]
async fn esearch_map_correlates_by_tag() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1 ESEARCH"))
            .write(b"TAG1 SEARCH RETURN (MIN MAX) UNSEEN\r\n")
            .read(b"* ESEARCH (TAG \"TAG1\") MIN 2 MAX 47\r\nTAG1 OK done\r\n"),
    )
    .await;
    let map = client
        .esearch("UNSEEN", &["MIN", "MAX"], false)
        .await
        .unwrap();
    assert_eq!(map.get("MIN").unwrap(), "2");
    assert_eq!(map.get("MAX").unwrap(), "47");
}

#[tokio::test]
async fn esort_return_options_precede_sort_criteria() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1 ESORT"))
            .write(b"TAG1 UID SORT RETURN (ALL) (REVERSE DATE) UTF-8 ALL\r\n")
            .read(b"* ESEARCH (TAG \"TAG1\") UID ALL 2:4\r\nTAG1 OK done\r\n"),
    )
    .await;
    let map = client
        .esort(&["REVERSE", "DATE"], "", &[], true)
        .await
        .unwrap();
    // the UID marker before the first key must not shift the pairs
    assert_eq!(map.get("ALL").unwrap(), "2:4");
}

#[tokio::test]
async fn thread_parses_nested_groups() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1 THREAD=REFERENCES"))
            .write(b"TAG1 UID THREAD REFERENCES UTF-8 ALL\r\n")
            .read(b"* THREAD (2)(3 6 (4 23))\r\nTAG1 OK done\r\n"),
    )
    .await;
    let nodes = client.thread("", true).await.unwrap();
    assert_eq!(nodes[0], ThreadNode::Id(2));
    assert_eq!(
        nodes[1],
        ThreadNode::Group(vec![
            ThreadNode::Id(3),
            ThreadNode::Id(6),
            ThreadNode::Group(vec![ThreadNode::Id(4), ThreadNode::Id(23)]),
        ])
    );
}

#[tokio::test]
async fn store_negative_response_surfaces() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 STORE 1 +FLAGS.SILENT (\\Seen)\r\n")
            .read(b"TAG1 NO no permission\r\n"),
    )
    .await;
    let err = client
        .store("1", false, "+FLAGS.SILENT", &["\\Seen"])
        .await
        .unwrap_err();
    let Error::NegativeResponse(batch) = err else {
        panic!("expected a negative response");
    };
    assert_eq!(batch.last().unwrap().human_readable, "no permission");
}

#[tokio::test]
async fn append_streams_body_and_returns_appenduid() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 APPEND \"Sent\" (\\Seen) {10}\r\n")
            .read(b"+ go ahead\r\n")
            .write(b"hello body")
            .write(b"\r\n")
            .read(b"TAG1 OK [APPENDUID 38505 101] done\r\n"),
    )
    .await;
    let mut body = std::io::Cursor::new(b"hello body".to_vec());
    let uid = client
        .append("Sent", &mut body, 10, Some(&["\\Seen"]), None)
        .await
        .unwrap();
    assert_eq!(uid, Some(101));
}

#[tokio::test]
async fn list_status_attaches_counts() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1 LIST-STATUS"))
            .write(b"TAG1 LIST \"\" \"*\" RETURN (STATUS (MESSAGES UNSEEN UIDNEXT))\r\n")
            .read(
                b"* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n\
* STATUS \"INBOX\" (MESSAGES 17 UNSEEN 3 UIDNEXT 4392)\r\n\
TAG1 OK done\r\n",
            ),
    )
    .await;
    let folders = client.folder_status_list("", "*").await.unwrap();
    assert_eq!(folders.len(), 1);
    assert!(folders[0].is_inbox());
    let status = folders[0].status.as_ref().unwrap();
    assert_eq!(status.get("MESSAGES").unwrap(), "17");
    assert_eq!(status.get("UIDNEXT").unwrap(), "4392");
}

#[tokio::test]
async fn move_requires_capability() {
    let mut client = client_with(Builder::new().read(&greeting("IMAP4rev1"))).await;
    let err = client.move_("1:3", "Archive", true).await.unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[tokio::test]
async fn expunge_uses_uid_range_with_uidplus() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1 UIDPLUS"))
            .write(b"TAG1 UID EXPUNGE 4:7\r\n")
            .read(b"TAG1 OK done\r\n"),
    )
    .await;
    client.expunge(Some("4:7")).await.unwrap();
}

#[tokio::test]
async fn expunge_falls_back_without_uidplus() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 EXPUNGE\r\n")
            .read(b"TAG1 OK done\r\n"),
    )
    .await;
    client.expunge(Some("4:7")).await.unwrap();
}

#[tokio::test]
async fn quota_reports_storage_root() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1 QUOTA"))
            .write(b"TAG1 GETQUOTAROOT \"INBOX\"\r\n")
            .read(
                b"* QUOTAROOT \"INBOX\" \"\"\r\n\
* QUOTA \"\" (STORAGE 10 512)\r\n\
TAG1 OK done\r\n",
            ),
    )
    .await;
    let usage = client.quota().await.unwrap().unwrap();
    assert_eq!(usage.storage_used, 10);
    assert_eq!(usage.storage_limit, 512);
}

#[tokio::test]
async fn quota_is_none_without_capability() {
    let mut client = client_with(Builder::new().read(&greeting("IMAP4rev1"))).await;
    assert!(client.quota().await.unwrap().is_none());
}

#[tokio::test]
async fn namespace_groups() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1 NAMESPACE"))
            .write(b"TAG1 NAMESPACE\r\n")
            .read(b"* NAMESPACE ((\"\" \"/\")) NIL ((\"#shared/\" \"/\"))\r\nTAG1 OK done\r\n"),
    )
    .await;
    let spaces = client.namespace().await.unwrap().unwrap();
    assert_eq!(spaces.personal[0].delimiter, "/");
    assert!(spaces.other_users.is_empty());
    assert_eq!(spaces.shared[0].prefix, "#shared/");
}

#[tokio::test]
async fn logout_without_login_sends_nothing() {
    let mut client = client_with(Builder::new().read(&greeting("IMAP4rev1"))).await;
    client.logout().await.unwrap();
    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn bye_terminal_is_negative() {
    let mut client = client_with(
        Builder::new()
            .read(&greeting("IMAP4rev1"))
            .write(b"TAG1 NOOP\r\n")
            .read(b"* BYE shutting down\r\nTAG1 NO gone\r\n"),
    )
    .await;
    let err = client.noop().await.unwrap_err();
    assert!(matches!(err, Error::NegativeResponse(_)));
}
