//! Scripted in-memory storefront implementing the `PageDriver` port.
//!
//! The shop understands exactly the selectors of `PageContract::default()`.
//! Every reload starts a new node generation, so handles taken before a
//! reload fail with `Error::Stale` just like on a live page. Failure knobs on
//! `ShopSetup` reproduce the flaky behaviour the engine has to survive.
#![allow(dead_code)]

use facetprobe::detail::{DetailDocument, DetailSource};
use facetprobe::{ElementHandle, Error, PageContract, PageDriver, ProbeConfig, Result};
use std::cell::RefCell;
use std::collections::HashMap;

pub const BASE_URL: &str = "https://shop.test/de";

/// Fast waits so failing conditions time out quickly.
pub fn test_config() -> ProbeConfig {
    ProbeConfig {
        url: BASE_URL.to_string(),
        timeout_ms: 60,
        confirm_timeout_ms: 60,
        poll_interval_ms: 5,
        max_retries: 3,
        case_retries: 2,
        parallelism: 2,
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub struct FakeFacet {
    pub title: String,
    pub options: Vec<(String, u32)>,
}

impl FakeFacet {
    pub fn new(title: &str, options: &[(&str, u32)]) -> Self {
        Self {
            title: title.to_string(),
            options: options.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeProduct {
    pub name: String,
    pub brand: String,
    pub category: String,
    pub badges: Vec<String>,
    pub sale: bool,
    pub new: bool,
    pub out_of_stock: bool,
    /// Relative href as the site renders it
    pub link: Option<String>,
}

impl FakeProduct {
    pub fn new(name: &str, brand: &str, category: &str, link: &str) -> Self {
        Self {
            name: name.to_string(),
            brand: brand.to_string(),
            category: category.to_string(),
            link: Some(link.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShopSetup {
    pub facets: Vec<FakeFacet>,
    pub products: Vec<FakeProduct>,
    /// Page loads on which the consent overlay fails to appear
    pub consent_failures: u32,
    /// Facet group clicks that do not open the dropdown
    pub open_failures: u32,
    /// Option label reads that hit a re-rendered node
    pub stale_option_reads: u32,
    /// Link lookups that re-render the whole listing, staling every tile
    pub tile_rerenders: u32,
    pub missing_close: bool,
}

impl ShopSetup {
    pub fn catalog() -> Self {
        Self {
            facets: vec![
                FakeFacet::new("Produktart", &[("Parfum", 12), ("Duschgel", 3)]),
                FakeFacet::new("Marke", &[("Chanel", 12), ("Dior", 4)]),
                FakeFacet::new("Highlights", &[("Neu", 5), ("Sale", 7), ("Limitiert", 2)]),
                FakeFacet::new("Geschenk für", &[("Muttertag", 3), ("Valentinstag", 6)]),
                FakeFacet::new("Für Wen", &[("Damen", 9), ("Herren", 4)]),
            ],
            products: vec![
                FakeProduct::new("No 5", "Chanel", "Parfum", "/de/p/1"),
                FakeProduct::new("Sauvage", "Dior", "Parfum", "/de/p/2"),
                FakeProduct::new("Coco", "Chanel", "Parfum", "/de/p/3"),
            ],
            consent_failures: 0,
            open_failures: 0,
            stale_option_reads: 0,
            tile_rerenders: 0,
            missing_close: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    ConsentOverlay,
    ConsentAccept,
    ListingEntry,
    Header,
    FacetGroup(usize),
    FacetTitle(usize),
    Option(usize, usize),
    OptionLabel(usize, usize),
    OptionCheckbox(usize, usize),
    Search,
    Close,
    Chip(usize),
    Tile(usize),
    TileName(usize),
    TileBrand(usize),
    TileCategory(usize),
    TileBadge(usize, usize),
    TileSale(usize),
    TileNew(usize),
    TileOutOfStock(usize),
    TileLink(usize),
}

struct State {
    setup: ShopSetup,
    url: String,
    generation: u64,
    handles: HashMap<(u64, Node), u64>,
    nodes: HashMap<u64, (u64, Node)>,
    next_id: u64,
    overlay_visible: bool,
    consent_accepted: bool,
    on_listing: bool,
    open_facet: Option<usize>,
    search: String,
    selected: Vec<String>,
    log: Vec<String>,
}

pub struct FakeShop {
    contract: PageContract,
    state: RefCell<State>,
}

impl FakeShop {
    pub fn new(setup: ShopSetup) -> Self {
        Self {
            contract: PageContract::default(),
            state: RefCell::new(State {
                setup,
                url: "about:blank".to_string(),
                generation: 0,
                handles: HashMap::new(),
                nodes: HashMap::new(),
                next_id: 1,
                overlay_visible: false,
                consent_accepted: false,
                on_listing: false,
                open_facet: None,
                search: String::new(),
                selected: Vec::new(),
                log: Vec::new(),
            }),
        }
    }

    /// A shop already past the consent overlay and showing the listing.
    pub fn on_listing(setup: ShopSetup) -> Self {
        let shop = Self::new(setup);
        {
            let mut state = shop.state.borrow_mut();
            state.consent_accepted = true;
            state.on_listing = true;
            state.url = format!("{}/c/parfum/01", BASE_URL);
        }
        shop
    }

    pub fn log(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    /// Log entries starting with `prefix`.
    pub fn entries(&self, prefix: &str) -> Vec<String> {
        self.log().into_iter().filter(|e| e.starts_with(prefix)).collect()
    }

    pub fn selected(&self) -> Vec<String> {
        self.state.borrow().selected.clone()
    }

    pub fn open_facet(&self) -> Option<String> {
        let state = self.state.borrow();
        state.open_facet.map(|f| state.setup.facets[f].title.clone())
    }

    fn load(state: &mut State) {
        state.generation += 1;
        state.open_facet = None;
        state.search.clear();
        state.overlay_visible = if state.consent_accepted {
            false
        } else if state.setup.consent_failures > 0 {
            state.setup.consent_failures -= 1;
            false
        } else {
            true
        };
    }

    fn option_visible(state: &State, facet: usize, option: usize) -> bool {
        if state.open_facet != Some(facet) {
            return false;
        }
        match state.setup.facets[facet].options.get(option) {
            Some((name, _)) => name.to_lowercase().contains(&state.search.to_lowercase()),
            None => false,
        }
    }

    fn visible_options(state: &State) -> Vec<(usize, usize)> {
        match state.open_facet {
            Some(f) => (0..state.setup.facets[f].options.len())
                .filter(|&o| Self::option_visible(state, f, o))
                .map(|o| (f, o))
                .collect(),
            None => Vec::new(),
        }
    }

    fn exists(state: &State, node: Node) -> bool {
        let tile = |i: usize| state.on_listing && i < state.setup.products.len();
        match node {
            Node::ConsentOverlay | Node::ConsentAccept => state.overlay_visible,
            Node::ListingEntry | Node::Header => true,
            Node::FacetGroup(i) | Node::FacetTitle(i) => state.on_listing && i < state.setup.facets.len(),
            Node::Option(f, o) | Node::OptionLabel(f, o) | Node::OptionCheckbox(f, o) => {
                Self::option_visible(state, f, o)
            }
            Node::Search => state.open_facet.is_some(),
            Node::Close => state.open_facet.is_some() && !state.setup.missing_close,
            Node::Chip(i) => state.on_listing && i < state.selected.len(),
            Node::Tile(i) | Node::TileName(i) | Node::TileBrand(i) | Node::TileCategory(i) => tile(i),
            Node::TileBadge(i, b) => tile(i) && b < state.setup.products[i].badges.len(),
            Node::TileSale(i) => tile(i) && state.setup.products[i].sale,
            Node::TileNew(i) => tile(i) && state.setup.products[i].new,
            Node::TileOutOfStock(i) => tile(i) && state.setup.products[i].out_of_stock,
            Node::TileLink(i) => tile(i) && state.setup.products[i].link.is_some(),
        }
    }

    fn matches(&self, state: &State, scope: Option<Node>, selector: &str) -> Vec<Node> {
        let c = &self.contract;
        let all = |nodes: Vec<Node>| -> Vec<Node> { nodes.into_iter().filter(|n| Self::exists(state, *n)).collect() };

        match scope {
            None => {
                if selector == c.consent_overlay {
                    all(vec![Node::ConsentOverlay])
                } else if selector == c.consent_accept {
                    all(vec![Node::ConsentAccept])
                } else if selector == c.listing_entry {
                    vec![Node::ListingEntry]
                } else if selector == c.header {
                    vec![Node::Header]
                } else if selector == c.facet_group {
                    all((0..state.setup.facets.len()).map(Node::FacetGroup).collect())
                } else if selector == c.facet_option {
                    Self::visible_options(state).into_iter().map(|(f, o)| Node::Option(f, o)).collect()
                } else if selector == c.facet_option_checkbox {
                    Self::visible_options(state)
                        .into_iter()
                        .map(|(f, o)| Node::OptionCheckbox(f, o))
                        .collect()
                } else if selector == c.facet_search {
                    all(vec![Node::Search])
                } else if selector == c.facet_close {
                    all(vec![Node::Close])
                } else if selector == c.selected_facets {
                    all((0..state.selected.len()).map(Node::Chip).collect())
                } else if selector == c.product_tile {
                    all((0..state.setup.products.len()).map(Node::Tile).collect())
                } else {
                    Vec::new()
                }
            }
            Some(Node::FacetGroup(i)) if selector == c.facet_title => vec![Node::FacetTitle(i)],
            Some(Node::Option(f, o)) if selector == c.facet_option_label => vec![Node::OptionLabel(f, o)],
            Some(Node::Option(f, o)) if selector == c.facet_option_checkbox => vec![Node::OptionCheckbox(f, o)],
            Some(Node::Tile(i)) => {
                if selector == c.tile_name {
                    vec![Node::TileName(i)]
                } else if selector == c.tile_brand {
                    vec![Node::TileBrand(i)]
                } else if selector == c.tile_category {
                    vec![Node::TileCategory(i)]
                } else if selector == c.tile_badges {
                    all((0..state.setup.products[i].badges.len()).map(|b| Node::TileBadge(i, b)).collect())
                } else if selector == c.tile_sale_marker {
                    all(vec![Node::TileSale(i)])
                } else if selector == c.tile_new_marker {
                    all(vec![Node::TileNew(i)])
                } else if selector == c.tile_out_of_stock {
                    all(vec![Node::TileOutOfStock(i)])
                } else if selector == c.tile_link {
                    all(vec![Node::TileLink(i)])
                } else {
                    Vec::new()
                }
            }
            Some(_) => Vec::new(),
        }
    }

    fn handle(state: &mut State, node: Node, selector: &str) -> ElementHandle {
        let key = (state.generation, node);
        let id = match state.handles.get(&key) {
            Some(id) => *id,
            None => {
                let id = state.next_id;
                state.next_id += 1;
                state.handles.insert(key, id);
                state.nodes.insert(id, key);
                id
            }
        };
        ElementHandle::new(id, selector)
    }

    /// Resolve a handle to its node, failing with `Stale` like a live page would.
    fn resolve(state: &State, element: &ElementHandle) -> Result<Node> {
        match state.nodes.get(&element.id) {
            Some((generation, node)) if *generation == state.generation && Self::exists(state, *node) => Ok(*node),
            _ => Err(Error::Stale(element.selector.clone())),
        }
    }
}

impl PageDriver for FakeShop {
    fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.url = url.to_string();
        state.on_listing = false;
        state.log.push(format!("navigate {}", url));
        Self::load(&mut state);
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.log.push("reload".to_string());
        Self::load(&mut state);
        Ok(())
    }

    fn current_url(&self) -> Result<String> {
        Ok(self.state.borrow().url.clone())
    }

    fn query_all(&self, scope: Option<&ElementHandle>, selector: &str) -> Result<Vec<ElementHandle>> {
        let mut state = self.state.borrow_mut();
        let scope = match scope {
            Some(handle) => Some(Self::resolve(&state, handle)?),
            None => None,
        };
        if matches!(scope, Some(Node::Tile(_))) && selector == self.contract.tile_link && state.setup.tile_rerenders > 0 {
            state.setup.tile_rerenders -= 1;
            state.generation += 1;
            state.log.push("rerender".to_string());
            return Err(Error::Stale(selector.to_string()));
        }
        let nodes = self.matches(&state, scope, selector);
        Ok(nodes.into_iter().map(|n| Self::handle(&mut state, n, selector)).collect())
    }

    fn text(&self, element: &ElementHandle) -> Result<String> {
        let mut state = self.state.borrow_mut();
        let node = Self::resolve(&state, element)?;
        let text = match node {
            Node::FacetTitle(i) => state.setup.facets[i].title.clone(),
            Node::OptionLabel(f, o) => {
                if state.setup.stale_option_reads > 0 {
                    state.setup.stale_option_reads -= 1;
                    state.log.push("stale option".to_string());
                    return Err(Error::Stale(element.selector.clone()));
                }
                let (name, count) = &state.setup.facets[f].options[o];
                format!("{} ({})", name, count)
            }
            Node::Chip(i) => state.selected[i].clone(),
            Node::Close => "SCHLIESSEN".to_string(),
            Node::TileName(i) => state.setup.products[i].name.clone(),
            Node::TileBrand(i) => state.setup.products[i].brand.clone(),
            Node::TileCategory(i) => state.setup.products[i].category.clone(),
            Node::TileBadge(i, b) => state.setup.products[i].badges[b].clone(),
            _ => String::new(),
        };
        Ok(text)
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let state = self.state.borrow();
        let node = Self::resolve(&state, element)?;
        Ok(match (node, name) {
            (Node::Search, "value") => Some(state.search.clone()),
            (Node::TileLink(i), "href") => state.setup.products[i].link.clone(),
            _ => None,
        })
    }

    fn is_displayed(&self, element: &ElementHandle) -> Result<bool> {
        Self::resolve(&self.state.borrow(), element).map(|_| true)
    }

    fn is_enabled(&self, element: &ElementHandle) -> Result<bool> {
        Self::resolve(&self.state.borrow(), element).map(|_| true)
    }

    fn click(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let node = Self::resolve(&state, element)?;
        match node {
            Node::ConsentAccept => {
                state.consent_accepted = true;
                state.overlay_visible = false;
                state.log.push("accept consent".to_string());
            }
            Node::ListingEntry => {
                state.on_listing = true;
                state.url = format!("{}/c/parfum/01", BASE_URL);
                state.log.push("listing".to_string());
            }
            Node::FacetGroup(i) => {
                let title = state.setup.facets[i].title.clone();
                if state.setup.open_failures > 0 {
                    state.setup.open_failures -= 1;
                    state.log.push(format!("dropdown-stuck {}", title));
                } else {
                    state.open_facet = Some(i);
                    state.search.clear();
                    state.log.push(format!("dropdown {}", title));
                }
            }
            Node::OptionCheckbox(f, o) => {
                let name = state.setup.facets[f].options[o].0.clone();
                if !state.selected.contains(&name) {
                    state.selected.push(name.clone());
                }
                state.log.push(format!("select {}", name));
            }
            Node::Close => {
                state.open_facet = None;
                state.log.push("close".to_string());
            }
            _ => {}
        }
        Ok(())
    }

    fn hover(&self, element: &ElementHandle) -> Result<()> {
        Self::resolve(&self.state.borrow(), element).map(|_| ())
    }

    fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        Self::resolve(&self.state.borrow(), element).map(|_| ())
    }

    fn type_text(&self, element: &ElementHandle, text: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match Self::resolve(&state, element)? {
            Node::Search => {
                state.search = text.to_string();
                state.log.push(format!("search {}", text));
                Ok(())
            }
            _ => Err(Error::NotInteractable(element.selector.clone())),
        }
    }

    fn screenshot_png(&self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG fake".to_vec())
    }
}

/// Detail documents served from memory; unknown URLs fail like a 404.
pub struct MemoryDetails {
    pages: HashMap<String, String>,
    fetched: RefCell<Vec<String>>,
}

impl MemoryDetails {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages.iter().map(|(u, b)| (u.to_string(), b.to_string())).collect(),
            fetched: RefCell::new(Vec::new()),
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }
}

impl DetailSource for MemoryDetails {
    fn fetch(&self, url: &str) -> Result<DetailDocument> {
        self.fetched.borrow_mut().push(url.to_string());
        match self.pages.get(url) {
            Some(body) => DetailDocument::parse(url, body, &PageContract::default()),
            None => Err(Error::Fetch {
                url: url.to_string(),
                reason: "404 Not Found".into(),
            }),
        }
    }
}

/// Minimal detail page with optional gift occasion and badges.
pub fn detail_page(gift: Option<&str>, badges: &[&str]) -> String {
    let mut body = String::from("<html><body>");
    for badge in badges {
        body.push_str(&format!("<div class=\"eyecatcher\"><span>{}</span></div>", badge));
    }
    if let Some(gift) = gift {
        body.push_str(&format!(
            "<div class=\"classification\"><span>Geschenk für</span><span>{}</span></div>",
            gift
        ));
    }
    body.push_str("</body></html>");
    body
}
