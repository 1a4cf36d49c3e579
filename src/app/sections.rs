use crate::Result;
use crate::cli::ListSectionsArgs;
use crate::core::operations;
use crate::core::options::ListSectionsOptions;
use crate::core::sections::Section;

pub fn handle_list_sections(args: ListSectionsArgs) -> Result<()> {
    let output = operations::list_sections(ListSectionsOptions {
        pattern: args.pattern,
    })?;
    for line in render_sections(&output.value.sections) {
        println!("{line}");
    }
    Ok(())
}

fn render_sections(sections: &[Section]) -> Vec<String> {
    let width = sections
        .iter()
        .map(|section| section.name.len())
        .max()
        .unwrap_or(0);
    sections
        .iter()
        .map(|section| format!("{:<width$}  {}", section.name, section.description))
        .collect()
}
