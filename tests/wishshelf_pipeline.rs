mod catalog_stub;

use std::fs;

use catalog_stub::CatalogStub;
use predicates::prelude::*;
use wishshelf::formats::Book;

const FIRST_PAGE: &str = "/people/reader/wish?start=0";
const THIRD_PAGE: &str = "/people/reader/wish?start=30";
const FOURTH_PAGE: &str = "/people/reader/wish?start=45";
const GOOD_COVER: &str = "/covers/101.jpg?w=90";
const MISSING_COVER: &str = "/covers/missing.jpg";

fn no_delay_args() -> [&'static str; 6] {
    ["--min-delay-ms", "0", "--max-delay-ms", "0", "--retries", "2"]
}

#[test]
fn build_scrapes_downloads_and_renders_pages() -> anyhow::Result<()> {
    let stub = CatalogStub::spawn();
    let temp = tempfile::TempDir::new()?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wishshelf");
    cmd.current_dir(temp.path())
        .args([
            "build",
            "reader",
            "--base-url",
            &stub.base_url,
            "--columns",
            "2",
            "--rows-per-page",
            "1",
        ])
        .args(no_delay_args())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Saved 3 books to douban_wish_reader.json",
        ))
        .stdout(predicate::str::contains(
            "WARNING: 1 covers failed to download.",
        ))
        .stdout(predicate::str::contains(" - Book B ("))
        .stdout(predicate::str::contains("Local covers available: 1 / 3"));

    assert_eq!(stub.request_count(FIRST_PAGE), 1);
    assert_eq!(stub.request_count(THIRD_PAGE), 1);
    assert_eq!(stub.request_count(FOURTH_PAGE), 0);
    assert_eq!(stub.request_count(GOOD_COVER), 1);
    assert_eq!(stub.request_count(MISSING_COVER), 2);

    let books: Vec<Book> =
        serde_json::from_str(&fs::read_to_string(temp.path().join("douban_wish_reader.json"))?)?;
    assert_eq!(books.len(), 3);
    assert_eq!(books[0].title, "Book A");
    assert_eq!(books[0].book_id.as_deref(), Some("101"));
    assert_eq!(books[0].rating, Some(9.1));
    assert_eq!(books[0].rating_count, Some(42));
    assert_eq!(books[0].authors, vec!["Author A"]);
    assert!(
        books[0]
            .cover_image
            .as_deref()
            .is_some_and(|cover| cover.starts_with("http://"))
    );
    assert_eq!(books[1].publisher.as_deref(), Some("Press B"));
    assert_eq!(books[2].summary.as_deref(), Some("A book without a cover."));

    assert_eq!(
        fs::read(temp.path().join("img").join("101.jpg"))?,
        CatalogStub::cover_jpg()
    );
    assert!(!temp.path().join("img").join("102.jpg").exists());

    let page_one = fs::read_to_string(temp.path().join("douban_wish_reader.md"))?;
    assert!(page_one.contains(r#"<img src="img/101.jpg""#));
    assert_eq!(page_one.matches("<td ").count(), 2);
    assert!(page_one.contains("Author A / Press A / 2001-1"));

    let page_two_path = temp
        .path()
        .join("douban_wish_reader_2")
        .join("index.md");
    let page_two = fs::read_to_string(page_two_path)?;
    assert_eq!(page_two.matches("<td ").count(), 1);
    assert!(!page_two.contains("<img"));
    assert!(page_two.contains("暂无信息"));

    Ok(())
}

#[test]
fn rerender_reuses_cached_covers_without_fetching() -> anyhow::Result<()> {
    let stub = CatalogStub::spawn();
    let temp = tempfile::TempDir::new()?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wishshelf");
    cmd.current_dir(temp.path())
        .args(["build", "reader", "--base-url", &stub.base_url])
        .args(no_delay_args())
        .assert()
        .success();
    assert_eq!(stub.request_count(GOOD_COVER), 1);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wishshelf");
    cmd.current_dir(temp.path())
        .args(["render", "douban_wish_reader.json", "--output", "site/wish.md"])
        .args(no_delay_args())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Reused 1 existing cover(s) from img",
        ));

    assert_eq!(stub.request_count(GOOD_COVER), 1);

    let page = fs::read_to_string(temp.path().join("site").join("wish.md"))?;
    assert!(page.contains(r#"<img src="../img/101.jpg""#));
    Ok(())
}

#[test]
fn scrape_writes_json_and_respects_page_cap() -> anyhow::Result<()> {
    let stub = CatalogStub::spawn();
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("wish.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wishshelf");
    cmd.args([
        "scrape",
        "reader",
        "--base-url",
        &stub.base_url,
        "--max-pages",
        "1",
        "--output",
    ])
    .arg(&out)
    .assert()
    .success()
    .stdout(predicate::str::contains("Saved 2 books to"));

    assert_eq!(stub.request_count(FIRST_PAGE), 1);
    assert_eq!(stub.request_count("/people/reader/wish?start=15"), 0);

    let text = fs::read_to_string(&out)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let keys = value[0]
        .as_object()
        .map(|object| object.keys().cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    let mut expected = vec![
        "added_at",
        "authors",
        "book_id",
        "cover_image",
        "douban_url",
        "publish_date",
        "publisher",
        "rating",
        "rating_count",
        "raw_pub",
        "summary",
        "title",
    ];
    expected.sort_unstable();
    let mut keys = keys;
    keys.sort();
    assert_eq!(keys, expected);
    Ok(())
}

#[test]
fn scrape_page_failure_aborts_the_run() -> anyhow::Result<()> {
    let stub = CatalogStub::spawn();
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("broken.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wishshelf");
    cmd.args(["scrape", "broken", "--base-url", &stub.base_url, "--output"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("500"));

    assert!(!out.exists());
    Ok(())
}

#[test]
fn skip_download_renders_remote_covers_as_placeholders() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let json = temp.path().join("wish.json");
    fs::write(
        &json,
        r#"[{"title": "Remote", "douban_url": "https://book.douban.com/subject/5/",
             "cover_image": "https://img.example.com/5.jpg", "raw_pub": "X / Y / 1999",
             "book_id": "5"}]"#,
    )?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wishshelf");
    cmd.current_dir(temp.path())
        .args(["render", "wish.json", "--skip-download", "--columns", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped download"))
        .stdout(predicate::str::contains("Local covers available: 0 / 1"));

    let page = fs::read_to_string(temp.path().join("wish.md"))?;
    assert!(!page.contains("<img"));
    assert!(!page.contains("img.example.com"));
    assert!(page.contains("<col style='width:100.00%;' />"));
    assert!(!temp.path().join("img").exists());
    Ok(())
}

#[test]
fn colliding_cache_keys_are_reported_on_stderr() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    fs::create_dir_all(temp.path().join("img"))?;
    fs::write(temp.path().join("img").join("1.jpg"), CatalogStub::cover_jpg())?;
    fs::write(
        temp.path().join("wish.json"),
        r#"[{"title": "First", "cover_image": "https://img.example.com/a.jpg", "book_id": "1"},
            {"title": "Second", "cover_image": "https://img.example.com/b.jpg", "book_id": "1"}]"#,
    )?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wishshelf");
    cmd.current_dir(temp.path())
        .env_remove("RUST_LOG")
        .args(["render", "wish.json", "--skip-download"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reused 2 existing cover(s) from img"))
        .stdout(predicate::str::contains("Local covers available: 2 / 2"))
        .stderr(predicate::str::contains("some cache keys collide"));

    let page = fs::read_to_string(temp.path().join("wish.md"))?;
    assert_eq!(page.matches(r#"<img src="img/1.jpg""#).count(), 2);
    Ok(())
}

#[test]
fn rust_log_debug_emits_parsed_cli_to_stderr() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    fs::write(temp.path().join("empty.json"), "[]")?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wishshelf");
    cmd.current_dir(temp.path())
        .env("RUST_LOG", "debug")
        .args(["render", "empty.json", "--skip-download"])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}
