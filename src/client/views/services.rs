use crate::client::controllers::service_catalog::ServiceCatalog;
use crate::client::views::widgets::alert;

pub fn view(catalog: &ServiceCatalog) -> String {
    let mut out = format!("== My services{} ==\n", alert::loading(&catalog.ui));
    out.push_str(&alert::view(&catalog.ui));
    if !catalog.can_edit() {
        out.push_str("Only verified providers can change the services they offer.\n");
    }
    for category in catalog.categories().iter() {
        out.push_str(&format!("{}\n", category.name));
        for service in &category.services {
            let mark = if catalog.is_offered(service.id) { "[x]" } else { "[ ]" };
            out.push_str(&format!("  {} {} {}\n", mark, service.id, service.name));
        }
    }
    out
}
