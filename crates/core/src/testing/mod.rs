//! Testing utilities and mock implementations of the collaborator traits.
//!
//! The mocks record what the dispatcher hands them so tests can assert on
//! call counts, requests and emitted statistics without a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use sitesweep_core::testing::{fixtures, MockFetcher, MockStatisticsSink};
//!
//! let fetcher = Arc::new(MockFetcher::with_body(fixtures::NEXUS_LISTING_HTML));
//! let statistics = Arc::new(MockStatisticsSink::new());
//! let ctx = SpiderContext::default().with_fetcher(fetcher.clone());
//! let dispatcher = Dispatcher::new(registry, ctx).with_statistics(statistics.clone());
//!
//! dispatcher.search(1, Some(&site), "earth", None, None).await;
//! assert_eq!(fetcher.requests().len(), 1);
//! assert_eq!(statistics.recorded().len(), 1);
//! ```

mod mock_fetcher;
mod mock_plugin_host;
mod mock_sinks;

pub use mock_fetcher::{MockFetcher, MockRenderer};
pub use mock_plugin_host::MockPluginHost;
pub use mock_sinks::{MockProgressSink, MockRateLimiter, MockResultFilter, MockStatisticsSink};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};

    use crate::searcher::TorrentRecord;

    /// A NexusPHP-style site with a cookie and listing selectors.
    pub fn nexus_site_raw() -> Value {
        json!({
            "id": "nexus",
            "name": "Nexus",
            "domain": "https://nexus.example/",
            "cookie": "uid=1; pass=abc",
            "search": {
                "paths": [{"path": "torrents.php", "method": "get"}]
            },
            "browse": {
                "path": "torrents.php?inclbookmarked=0",
                "start": 1
            },
            "torrents": {
                "list": {"selector": "table.torrents > tbody > tr"},
                "fields": {
                    "title": {"selector": "td.name a.title", "attribute": "title"},
                    "description": {"selector": "td.name span.subtitle"},
                    "details": {"selector": "td.name a.title", "attribute": "href"},
                    "download": {"selector": "td.name a.download", "attribute": "href"},
                    "imdbid": {"selector": "td.name a.imdb", "attribute": "href"},
                    "size": {"selector": "td.size"},
                    "seeders": {"selector": "td.seeders"},
                    "leechers": {"selector": "td.leechers"},
                    "grabs": {"selector": "td.grabs"},
                    "date_added": {"selector": "td.added span", "attribute": "title"},
                    "hr": {"selector": "img.hitandrun", "attribute": "alt"},
                    "downloadvolumefactor": {
                        "case": {"img.pro_free": 0, "img.pro_50pctdown": 0.5, "*": 1}
                    },
                    "uploadvolumefactor": {
                        "case": {"img.pro_2up": 2, "*": 1}
                    }
                }
            },
            "pri": 5
        })
    }

    /// Listing page for [`nexus_site_raw`]: a header row and two torrents.
    pub const NEXUS_LISTING_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
<table class="torrents">
<tbody>
<tr><td class="colhead">Name</td><td class="colhead">Size</td></tr>
<tr>
  <td class="name">
    <a class="title" href="details.php?id=101" title="The.Wandering.Earth.2019.1080p.BluRay"><b>The.Wandering.Earth.2019.1080p.BluRay</b></a>
    <img class="pro_free" src="free.gif" alt="Free">
    <img class="hitandrun" src="hr.gif" alt="H&amp;R">
    <span class="subtitle">流浪地球</span>
    <a class="imdb" href="https://www.imdb.com/title/tt7605074/">IMDb</a>
    <a class="download" href="download.php?id=101">DL</a>
  </td>
  <td class="added"><span title="2024-01-01 08:00:00">2 days</span></td>
  <td class="size">1.5 GB</td>
  <td class="seeders">1,234</td>
  <td class="leechers">5</td>
  <td class="grabs">88</td>
</tr>
<tr>
  <td class="name">
    <a class="title" href="details.php?id=102" title="Some.Show.S01E01.720p.WEB-DL">Some.Show.S01E01.720p.WEB-DL</a>
    <span class="subtitle">Pilot</span>
    <a class="download" href="download.php?id=102">DL</a>
  </td>
  <td class="added"><span title="2024-01-02 10:00:00">1 day</span></td>
  <td class="size">700 MiB</td>
  <td class="seeders">12</td>
  <td class="leechers">0</td>
  <td class="grabs">40</td>
</tr>
</tbody>
</table>
</body>
</html>"#;

    /// An M-Team style API-key site.
    pub fn mteam_site_raw() -> Value {
        json!({
            "id": "mteam",
            "name": "M-Team",
            "domain": "https://kp.m-team.cc/",
            "search": {"paths": [{"path": "api/torrent/search", "method": "post"}]},
            "pri": "10"
        })
    }

    /// Search response with one `_2X_FREE` and one `NORMAL` torrent.
    pub const MTEAM_SEARCH_RESPONSE: &str = r#"{
        "code": "0",
        "message": "SUCCESS",
        "data": {
            "pageNumber": "1",
            "pageSize": "100",
            "total": "2",
            "data": [
                {
                    "id": "770123",
                    "name": "Dune.Part.Two.2024.2160p.UHD.BluRay",
                    "smallDescr": "沙丘2",
                    "createdDate": "2024-03-19 09:00:00",
                    "lastModifiedDate": "2024-03-20 12:00:00",
                    "size": "85899345920",
                    "imdb": "https://www.imdb.com/title/tt15239678/",
                    "status": {
                        "seeders": "321",
                        "leechers": "12",
                        "timesCompleted": "4567",
                        "discount": "_2X_FREE"
                    }
                },
                {
                    "id": 770124,
                    "name": "Dune.Part.Two.2024.1080p.WEB-DL",
                    "smallDescr": "",
                    "lastModifiedDate": "2024-03-21 12:00:00",
                    "size": 4294967296,
                    "imdb": "",
                    "status": {
                        "seeders": 40,
                        "leechers": 2,
                        "timesCompleted": 100,
                        "discount": "NORMAL"
                    }
                }
            ]
        }
    }"#;

    /// Detail response for a `FREE` torrent with 88 seeders.
    pub const MTEAM_DETAIL_RESPONSE: &str = r#"{
        "code": "0",
        "message": "SUCCESS",
        "data": {
            "id": "770123",
            "status": {"seeders": "88", "leechers": "1", "discount": "FREE"}
        }
    }"#;

    /// A record with reasonable defaults.
    pub fn torrent_record(site: &str, title: &str, seeders: u32) -> TorrentRecord {
        let mut record = TorrentRecord::new(site, title);
        record.indexer_name = site.to_string();
        record.size = 4 * 1024 * 1024 * 1024;
        record.seeders = seeders;
        record.page_url = format!("https://{}.example/details.php?id={}", site, seeders);
        record
    }
}
