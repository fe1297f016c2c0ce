use serde::{Deserialize, Serialize};

const YTS_TRACKERS: &[&str] = &[
    "udp://open.demonii.com:1337/announce",
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://tracker.openbittorrent.com:80",
    "udp://tracker.coppersurfer.tk:6969",
    "udp://glotorrents.pw:6969/announce",
    "udp://torrent.gresille.org:80/announce",
    "udp://p4p.arenabg.com:1337",
    "udp://tracker.leechers-paradise.org:6969",
];

/// A movie as returned by the index, with its releases in upstream order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MovieRecord {
    pub id: i64,
    pub title: String,
    pub year: i32,
    pub rating: f32,
    pub genres: Vec<String>,
    pub poster: Option<String>,
    pub page_url: String,
    pub imdb_code: Option<String>,
    pub runtime_minutes: u32,
    pub summary: Option<String>,
    pub date_uploaded: Option<String>,
    pub torrents: Vec<TorrentVariant>,
}

/// One quality release of a movie.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TorrentVariant {
    pub quality: String,
    pub release_type: Option<String>,
    pub size: Option<String>,
    pub seeds: u32,
    pub peers: u32,
    pub hash: String,
    pub download_url: String,
}

impl TorrentVariant {
    /// The direct `.torrent` URL, when the index gave an http(s) one.
    pub fn web_download_url(&self) -> Option<&str> {
        let url = self.download_url.trim();
        (url.starts_with("https://") || url.starts_with("http://")).then_some(url)
    }

    /// Direct URL when available, magnet URI otherwise.
    pub fn download_reference(&self, movie_title: &str) -> String {
        match self.web_download_url() {
            Some(url) => url.to_string(),
            None => self.magnet_uri(movie_title),
        }
    }

    pub fn magnet_uri(&self, movie_title: &str) -> String {
        let name = format!("{} [{}]", movie_title, self.quality);
        magnet_from_hash(&self.hash, Some(&name))
    }
}

/// Magnet URI for an info hash with the usual YTS trackers. `dn` is only
/// added when a display name is known.
pub fn magnet_from_hash(hash: &str, display_name: Option<&str>) -> String {
    let mut uri = format!("magnet:?xt=urn:btih:{}", hash);
    if let Some(name) = display_name {
        uri.push_str("&dn=");
        uri.push_str(&urlencoding::encode(name));
    }
    for tracker in YTS_TRACKERS {
        uri.push_str("&tr=");
        uri.push_str(&urlencoding::encode(tracker));
    }
    uri
}

/// Extra ratings from the auxiliary metadata source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalRatings {
    pub rotten_tomatoes: Option<String>,
    pub metascore: Option<String>,
}

impl ExternalRatings {
    pub fn is_empty(&self) -> bool {
        self.rotten_tomatoes.is_none() && self.metascore.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(download_url: &str) -> TorrentVariant {
        TorrentVariant {
            quality: "1080p".to_string(),
            release_type: Some("bluray".to_string()),
            size: Some("2.1 GB".to_string()),
            seeds: 10,
            peers: 2,
            hash: "ABCDEF0123".to_string(),
            download_url: download_url.to_string(),
        }
    }

    #[test]
    fn prefers_direct_download_url() {
        let v = variant("https://yts.mx/torrent/download/ABCDEF0123");
        assert_eq!(
            v.download_reference("Inception"),
            "https://yts.mx/torrent/download/ABCDEF0123"
        );
    }

    #[test]
    fn falls_back_to_magnet_with_trackers() {
        let v = variant("");
        let link = v.download_reference("Inception");
        assert!(link.starts_with("magnet:?xt=urn:btih:ABCDEF0123&dn=Inception%20%5B1080p%5D"));
        assert_eq!(link.matches("&tr=").count(), YTS_TRACKERS.len());
    }

    #[test]
    fn only_http_links_count_as_web_downloads() {
        assert_eq!(
            variant("http://yts.mx/torrent/download/A").web_download_url(),
            Some("http://yts.mx/torrent/download/A")
        );
        assert_eq!(variant("").web_download_url(), None);
        assert_eq!(variant("magnet:?xt=urn:btih:A").web_download_url(), None);
        assert_eq!(variant("ftp://mirror/a.torrent").web_download_url(), None);
    }

    #[test]
    fn magnet_without_name_has_no_dn() {
        let link = magnet_from_hash("ABC", None);
        assert!(link.starts_with("magnet:?xt=urn:btih:ABC&tr="));
        assert!(!link.contains("&dn="));
    }
}
