/// Seller identity taken from the `From` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerInfo {
    /// Sender mailbox, or the raw header when it holds no address
    pub address: String,
    /// Human-readable name for display
    pub display_name: String,
}

const UNKNOWN: &str = "Unknown";

pub fn extract_seller(from_header: &str) -> SellerInfo {
    let header = from_header.trim();
    if header.is_empty() {
        return SellerInfo {
            address: UNKNOWN.to_string(),
            display_name: UNKNOWN.to_string(),
        };
    }

    let (name, address) = match (header.rfind('<'), header.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = header[..open].trim().trim_matches('"').trim();
            let address = header[open + 1..close].trim();
            (Some(name), address)
        }
        _ => (None, header.trim_matches(['<', '>'])),
    };

    let display_name = match name {
        Some(name) if !name.is_empty() && !name.starts_with("=?") => name.to_string(),
        _ => match address.rsplit_once('@') {
            Some((_, domain)) => clean_domain(domain),
            None => address.to_string(),
        },
    };

    SellerInfo {
        address: address.to_string(),
        display_name,
    }
}

/// `mail.shop.co.uk` → `Shop`
pub fn clean_domain(domain: &str) -> String {
    let mut domain = domain.trim().trim_end_matches('>').to_lowercase();

    for prefix in ["www.", "mail.", "noreply.", "no-reply.", "email.", "e."] {
        if let Some(rest) = domain.strip_prefix(prefix) {
            domain = rest.to_string();
            break;
        }
    }
    for suffix in [".co.uk", ".co.in", ".com", ".org", ".net", ".in"] {
        if let Some(rest) = domain.strip_suffix(suffix) {
            domain = rest.to_string();
            break;
        }
    }

    if domain.is_empty() {
        return UNKNOWN.to_string();
    }
    title_case(&domain)
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start_of_word = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = true;
        }
    }
    out
}
