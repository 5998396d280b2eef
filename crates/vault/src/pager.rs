//! Lazy iteration over paginated part listings.

use crate::client::VaultClient;
use crate::error::VaultError;
use crate::types::{ListPartsOutput, ListPartsRequest};

/// Walks the pages of a `list_parts` listing, one round trip per page.
///
/// Pages are fetched only when asked for. After the last page, or after an
/// error, `next_page` returns `None`.
pub struct PartPager<'a> {
    client: &'a dyn VaultClient,
    request: ListPartsRequest,
    done: bool,
}

impl<'a> PartPager<'a> {
    /// Creates a pager starting at `request.marker`.
    pub fn new(client: &'a dyn VaultClient, request: ListPartsRequest) -> Self {
        Self {
            client,
            request,
            done: false,
        }
    }

    /// Fetches the next page.
    pub async fn next_page(&mut self) -> Option<Result<ListPartsOutput, VaultError>> {
        if self.done {
            return None;
        }

        match self.client.list_parts(self.request.clone()).await {
            Ok(page) => {
                self.done = page.marker.is_none();
                self.request.marker.clone_from(&page.marker);
                Some(Ok(page))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
