//! Launch builders shared by the service unit tests.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::models::{roll_up, ItemStatus, ItemTree, ItemType, Launch, TestItem};
use crate::domain::ports::LaunchRepository;

pub const PROJECT: &str = "demo";

/// Builds one launch and its item tree for unit tests.
///
/// The launch row is stored exactly as built, so repository tests can
/// compare it field by field. Items are created parents first. Each item starts one second after the
/// previous one and runs for one second, and sibling positions follow
/// creation order.
pub struct LaunchFixture {
    pub launch: Launch,
    pub items: Vec<TestItem>,
    clock: DateTime<Utc>,
}

impl LaunchFixture {
    pub fn new(name: &str, start: DateTime<Utc>) -> Self {
        let launch = Launch::new(PROJECT, name, start).finished(ItemStatus::Passed, start + Duration::minutes(1));
        Self {
            launch,
            items: Vec::new(),
            clock: start,
        }
    }

    pub fn numbered(mut self, number: i64) -> Self {
        self.launch.number = number;
        self
    }

    pub fn suite(&mut self, name: &str) -> Uuid {
        self.push(None, name, ItemType::Suite, ItemStatus::Passed)
    }

    pub fn step(&mut self, parent: Uuid, name: &str, status: ItemStatus) -> Uuid {
        self.push(Some(parent), name, ItemType::Step, status)
    }

    pub fn child(&mut self, parent: Uuid, name: &str, item_type: ItemType, status: ItemStatus) -> Uuid {
        self.push(Some(parent), name, item_type, status)
    }

    /// Record an earlier attempt of `item`.
    pub fn retry(&mut self, item: Uuid, status: ItemStatus) -> Uuid {
        let target = self.get(item).clone();
        let mut retry = TestItem::new(
            self.launch.id,
            target.name.clone(),
            target.item_type,
            status,
            target.start_time - Duration::milliseconds(500),
        );
        retry.parent_id = target.parent_id;
        retry.path = match target.path.rsplit_once('.') {
            Some((ancestors, _)) => format!("{ancestors}.{}", retry.id),
            None => retry.id.to_string(),
        };
        retry.position = target.position;
        retry.retry_of = Some(item);
        let id = retry.id;
        self.items.push(retry);
        if let Some(t) = self.items.iter_mut().find(|i| i.id == item) {
            t.has_retries = true;
        }
        id
    }

    pub fn get(&self, id: Uuid) -> &TestItem {
        self.items.iter().find(|i| i.id == id).expect("fixture item")
    }

    pub fn get_mut(&mut self, id: Uuid) -> &mut TestItem {
        self.items.iter_mut().find(|i| i.id == id).expect("fixture item")
    }

    /// Items with statistics and container statuses filled in bottom-up.
    pub fn finished_items(&self) -> Vec<TestItem> {
        let mut items = self.items.clone();
        roll_up(&mut items);
        items
    }

    pub fn tree(&self) -> ItemTree {
        ItemTree::from_items(self.launch.clone(), self.finished_items()).expect("fixture tree")
    }

    /// Store the launch and its items in one unit of work.
    pub async fn persist(&self, repo: &dyn LaunchRepository) {
        let mut uow = repo.begin().await.expect("begin");
        uow.save_launch(&self.launch).await.expect("save launch");
        for item in self.finished_items() {
            uow.save_test_item(&item).await.expect("save item");
        }
        uow.commit().await.expect("commit");
    }

    fn push(&mut self, parent: Option<Uuid>, name: &str, item_type: ItemType, status: ItemStatus) -> Uuid {
        self.clock += Duration::seconds(1);
        let position = self.items.iter().filter(|i| i.parent_id == parent && !i.is_retry()).count() as i64;
        let mut item = TestItem::new(self.launch.id, name, item_type, status, self.clock)
            .with_end_time(self.clock + Duration::seconds(1));
        if let Some(pid) = parent {
            let parent_item = self.get(pid).clone();
            item = item.under(&parent_item, position);
        } else {
            item.position = position;
        }
        let id = item.id;
        self.items.push(item);
        id
    }
}
