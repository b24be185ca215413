// OLX-specific HTML extraction
use crate::model::{ParseError, RawFieldMap, field};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// CSS selectors for one revision of the marketplace markup. Bump `version`
/// whenever any selector changes so stored rejections can be traced back.
#[derive(Debug, Clone, Copy)]
pub struct SelectorSet {
    pub version: &'static str,
    pub item: &'static str,
    pub title: &'static str,
    pub link: &'static str,
    pub image: &'static str,
    pub location: &'static str,
    pub price: &'static str,
    pub information: &'static str,
}

pub const OLX_SELECTORS_V1: SelectorSet = SelectorSet {
    version: "olx-cars-v1",
    item: "li._3V_Ww",
    title: "div._2Gr10",
    link: "a[href]",
    image: "img[src]",
    location: "div._3VRSm",
    price: "span._1zgtX",
    information: "div._21gnE",
};

/// Result of extracting every listing node on one page.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub nodes_seen: usize,
    pub listings: Vec<RawFieldMap>,
    pub errors: Vec<ParseError>,
}

pub trait ListingParser: Send + Sync {
    fn selector_version(&self) -> &str;
    fn parse_page(&self, html: &str) -> ParsedPage;
    fn extract_listing(&self, node: ElementRef<'_>) -> Result<RawFieldMap, ParseError>;
}

struct CompiledSelectors {
    item: Selector,
    title: Selector,
    link: Selector,
    image: Selector,
    location: Selector,
    price: Selector,
    information: Selector,
}

pub struct OlxParser {
    version: &'static str,
    origin: String,
    selectors: CompiledSelectors,
}

impl OlxParser {
    /// `origin` is prepended to relative listing links.
    pub fn new(set: SelectorSet, origin: &str) -> Result<Self, ParseError> {
        let compile = |css: &str| Selector::parse(css).map_err(|e| ParseError::Selector(format!("{css}: {e}")));

        Ok(Self {
            version: set.version,
            origin: origin.trim_end_matches('/').to_string(),
            selectors: CompiledSelectors {
                item: compile(set.item)?,
                title: compile(set.title)?,
                link: compile(set.link)?,
                image: compile(set.image)?,
                location: compile(set.location)?,
                price: compile(set.price)?,
                information: compile(set.information)?,
            },
        })
    }

    fn absolute_link(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if let Some(rest) = href.strip_prefix("//") {
            let scheme = self.origin.split_once("://").map_or("https", |(scheme, _)| scheme);
            format!("{}://{}", scheme, rest)
        } else {
            format!("{}/{}", self.origin, href.trim_start_matches('/'))
        }
    }
}

impl ListingParser for OlxParser {
    fn selector_version(&self) -> &str {
        self.version
    }

    fn parse_page(&self, html: &str) -> ParsedPage {
        let document = Html::parse_document(html);
        let mut page = ParsedPage::default();

        for node in document.select(&self.selectors.item) {
            page.nodes_seen += 1;
            match self.extract_listing(node) {
                Ok(raw) => page.listings.push(raw),
                Err(e) => {
                    debug!("Dropping listing node: {}", e);
                    page.errors.push(e);
                }
            }
        }

        page
    }

    fn extract_listing(&self, node: ElementRef<'_>) -> Result<RawFieldMap, ParseError> {
        let s = &self.selectors;
        let title = first_text(node, &s.title).ok_or(ParseError::MissingField(field::TITLE))?;
        let price = first_text(node, &s.price).ok_or(ParseError::MissingField(field::PRICE))?;
        let location = first_text(node, &s.location).ok_or(ParseError::MissingField(field::LOCATION))?;

        let mut raw = RawFieldMap::new()
            .with(field::TITLE, title)
            .with(field::PRICE, price)
            .with(field::LOCATION, location);

        if let Some(href) = first_attr(node, &s.link, "href") {
            raw.insert(field::LINK, self.absolute_link(&href));
        }
        if let Some(info) = first_text(node, &s.information) {
            raw.insert(field::INFORMATION, info);
        }
        if let Some(src) = first_attr(node, &s.image, "src") {
            raw.insert(field::IMAGE, src);
        }

        Ok(raw)
    }
}

fn first_text(node: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let el = node.select(selector).next()?;
    let text = el.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn first_attr(node: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    node.select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const PAGE: &str = r#"
        <html><body><ul>
          <li class="_3V_Ww">
            <a href="/item/maruti-suzuki-swift-vxi-iid-1001">
              <img src="https://apollo.olx.in/v1/files/1001.jpg">
              <span class="_1zgtX">₹ 5,25,000</span>
              <div class="_21gnE">2016 - 80,000 km</div>
              <div class="_2Gr10">Maruti Suzuki Swift VXI</div>
              <div class="_3VRSm">Kothrud, Pune</div>
            </a>
          </li>
          <li class="_3V_Ww">
            <a href="https://www.olx.in/item/hyundai-creta-iid-1002">
              <div class="_21gnE">2019 - 42,500 km</div>
              <span class="_1zgtX">₹ 9,75,000</span>
              <div class="_2Gr10">Hyundai Creta 1.6 SX</div>
              <div class="_3VRSm">Andheri East, Mumbai</div>
            </a>
          </li>
          <li class="_3V_Ww">
            <a href="/item/honda-city-iid-1003">
              <div class="_21gnE">2015 - 61,000 km</div>
              <div class="_2Gr10">Honda City VX</div>
              <div class="_3VRSm">Indiranagar, Bengaluru</div>
            </a>
          </li>
        </ul></body></html>
    "#;

    fn parser() -> OlxParser {
        OlxParser::new(OLX_SELECTORS_V1, "https://www.olx.in").unwrap()
    }

    #[test]
    fn extracts_complete_and_imageless_listings() {
        let page = parser().parse_page(PAGE);
        assert_eq!(page.nodes_seen, 3);
        assert_eq!(page.listings.len(), 2);

        let swift = &page.listings[0];
        assert_eq!(swift.get(field::TITLE), Some("Maruti Suzuki Swift VXI"));
        assert_eq!(swift.get(field::PRICE), Some("₹ 5,25,000"));
        assert_eq!(swift.get(field::INFORMATION), Some("2016 - 80,000 km"));
        assert_eq!(
            swift.get(field::LINK),
            Some("https://www.olx.in/item/maruti-suzuki-swift-vxi-iid-1001")
        );
        assert_eq!(swift.get(field::IMAGE), Some("https://apollo.olx.in/v1/files/1001.jpg"));

        let creta = &page.listings[1];
        assert_eq!(creta.get(field::IMAGE), None);
        assert_eq!(creta.get(field::LINK), Some("https://www.olx.in/item/hyundai-creta-iid-1002"));
    }

    #[test]
    fn missing_price_is_a_parse_error() {
        let page = parser().parse_page(PAGE);
        assert_eq!(page.errors, vec![ParseError::MissingField(field::PRICE)]);
    }

    #[test]
    fn page_without_items_is_empty() {
        let page = parser().parse_page("<html><body><p>No results</p></body></html>");
        assert_eq!(page.nodes_seen, 0);
        assert!(page.listings.is_empty());
        assert!(page.errors.is_empty());
    }

    #[test]
    fn protocol_relative_links_keep_their_host() {
        let parser = parser();
        assert_eq!(
            parser.absolute_link("//www.olx.in/item/tata-nexon-iid-1004"),
            "https://www.olx.in/item/tata-nexon-iid-1004"
        );
        assert_eq!(
            parser.absolute_link("item/tata-nexon-iid-1004"),
            "https://www.olx.in/item/tata-nexon-iid-1004"
        );
    }

    #[test]
    fn invalid_selector_is_reported() {
        let broken = SelectorSet { item: "li[", ..OLX_SELECTORS_V1 };
        assert!(matches!(OlxParser::new(broken, "https://www.olx.in"), Err(ParseError::Selector(_))));
    }

    #[test]
    fn selector_version_is_exposed() {
        assert_eq!(parser().selector_version(), "olx-cars-v1");
    }
}
